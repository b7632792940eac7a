//! Core data models for dpexplore.
//!
//! Epistemic mapping:
//! - K_i (Knowledge): Closed channel enumeration, checked deviation storage
//! - B_i (Beliefs): Operator input wrapped in Result
//! - I^R (Resolvable): Trust levels, budgets and limits from config

mod config;
mod deviation;
mod error;

pub use config::*;
pub use deviation::*;
pub use error::*;
