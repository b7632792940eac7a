//! Checkpoint module for resumable exploration runs.
//!
//! Provides:
//! - `RunCheckpoint`: Scheduler state plus run metadata
//! - `CheckpointManager`: Persistence and loading of checkpoint state

mod state;

pub use state::*;
