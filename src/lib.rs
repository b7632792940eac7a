//! dpexplore - Exploration decision engine for concurrent learning of
//! machine-learned interatomic potentials.
//!
//! ## Architecture
//!
//! One iteration of the loop, as seen from here:
//! - **Report**: classify every sampled frame by model deviation into
//!   accurate / candidate / failed against trust levels
//! - **Selector**: cap the candidates at the labeling budget and turn them
//!   into configurations
//! - **Schedulers**: decide per stage whether to iterate again, and move the
//!   run through its stages
//!
//! MD, labeling and training happen outside; the driver feeds reports back
//! in and receives the next task group.
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Closed enums for channels, frame classes and stage status
//! - B_i (Beliefs): Deviation input and persisted state (Result, Option)
//! - I^R (Resolvable): Trust levels, budgets and iteration limits from config
//! - I^B (Bounded): Runs that cannot improve end in a fatal error

pub mod checkpoint;
pub mod models;
pub mod report;
pub mod scheduler;
pub mod selector;

// Re-exports for convenience
pub use checkpoint::{CheckpointManager, RunCheckpoint};
pub use models::{Config, DeviationChannel, DeviationStore, ExploreError, Result};
pub use report::{DownsamplePolicy, ExplorationReport, FrameClass};
pub use scheduler::{
    ExplorationScheduler, ExplorationStage, ExplorationState, IterationPlan, StageScheduler,
    StageTemplate, TaskGroup,
};
pub use selector::{ConfSelector, ModelDeviTableRender, TrajRender};
