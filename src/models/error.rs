//! Error types for dpexplore.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Bad input caught before the run (channels, shapes, config)
//! - K_i terminal: Fatal conditions where the loop cannot make progress
//! - K_i violated: Misuse of the engine or internal invariant violations

use thiserror::Error;

/// Top-level error type for dpexplore.
#[derive(Debug, Error)]
pub enum ExploreError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED — Configuration / input errors (recoverable, pre-run)
    // ═══════════════════════════════════════════════════════════════════

    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Invalid deviation channel: '{0}'")]
    InvalidChannel(String),

    #[error("Deviation array for {channel} must be 1-D, got {ndim} dimensions")]
    InvalidShape { channel: String, ndim: usize },

    #[error("Inconsistent model deviation: {0}")]
    Inconsistent(String),

    #[error("Cannot find model deviation max_devi_f for trajectory {traj}")]
    MissingMaxDeviF { traj: usize },

    #[error("Parse error: {0}")]
    Parse(String),

    // ═══════════════════════════════════════════════════════════════════
    // TERMINAL — The exploration cannot continue without operator action
    // ═══════════════════════════════════════════════════════════════════

    #[error("Fatal: {0}")]
    Fatal(String),

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED — Misuse or broken invariant
    // ═══════════════════════════════════════════════════════════════════

    #[error("Report has not recorded any model deviation")]
    ReportNotRecorded,

    #[error("Cannot plan because the stage has completed")]
    StageCompleted,

    #[error("Cannot plan because the exploration has completed")]
    ExplorationCompleted,

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExploreError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Check if this error should stop the run.
    ///
    /// Fatal errors are never retried; the operator has to change the
    /// configuration (trust levels, `max_numb_iter`, `fatal_at_max`).
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// Prefix a fatal error with the stage it was raised in.
    ///
    /// Non-fatal errors pass through unchanged.
    pub fn in_stage(self, stage: usize) -> Self {
        match self {
            Self::Fatal(msg) => Self::Fatal(format!("stage {stage}: {msg}")),
            other => other,
        }
    }
}

/// Result type alias for dpexplore.
pub type Result<T> = std::result::Result<T, ExploreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_stage_tags_fatal_only() {
        let err = ExploreError::fatal("reached maximal number of iterations").in_stage(2);
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Fatal: stage 2: reached maximal number of iterations"
        );

        let err = ExploreError::ReportNotRecorded.in_stage(1);
        assert!(!err.is_fatal());
        assert!(matches!(err, ExploreError::ReportNotRecorded));
    }
}
