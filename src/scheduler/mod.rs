//! Exploration scheduling - stages, iterations and run progress.
//!
//! Flow:
//! ExplorationScheduler → current StageScheduler → (task group, selector)
//! → MD + selection outside → report → next plan
//!
//! K_i: One stage is active at a time; stages run in insertion order
//! B_i: Reports may be missing channels or empty → Result
//! I^R: Limits and convergence criterion come from config

mod exploration;
mod progress;
pub(crate) mod stage;
mod task;

pub use exploration::*;
pub use progress::*;
pub use stage::{ConvergenceCheck, IterationPlan, StageScheduler, StageState, StageStatus};
pub use task::*;
