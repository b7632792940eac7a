//! Configuration models for dpexplore.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The operator resolves these unknowns at runtime via config file.

use crate::report::DownsamplePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for an exploration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Iteration limits and labeling budget
    pub scheduler: SchedulerConfig,

    /// Trust levels and convergence criterion
    pub convergence: ConvergenceConfig,

    /// Strategy used when candidates exceed the labeling budget
    #[serde(default)]
    pub downsample: DownsamplePolicy,

    /// Stage task-group templates, in execution order
    #[serde(default)]
    pub stages: Vec<StageConfig>,
}

/// Scheduler configuration shared by all stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Maximum number of iterations per stage
    #[serde(default = "default_max_numb_iter")]
    pub max_numb_iter: usize,

    /// Raise a fatal error instead of completing the stage at the limit
    #[serde(default = "default_true")]
    pub fatal_at_max: bool,

    /// Maximum number of frames sent to labeling per iteration
    #[serde(default = "default_max_selected_frames")]
    pub max_selected_frames: usize,

    /// Element names, in the order used by the potential
    #[serde(default)]
    pub type_map: Vec<String>,
}

fn default_max_numb_iter() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_max_selected_frames() -> usize {
    100
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_numb_iter: default_max_numb_iter(),
            fatal_at_max: true,
            max_selected_frames: default_max_selected_frames(),
            type_map: Vec::new(),
        }
    }
}

/// Convergence criterion and trust levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConvergenceConfig {
    /// Fixed trust levels; converged when the accurate ratio is high enough.
    FixedLevels {
        level_f_lo: f64,
        level_f_hi: f64,
        #[serde(default)]
        level_v_lo: Option<f64>,
        #[serde(default)]
        level_v_hi: Option<f64>,
        #[serde(default = "default_conv_accuracy")]
        conv_accuracy: f64,
    },

    /// Fixed upper level, lower level adapted to a candidate budget.
    AdaptiveLower {
        level_f_hi: f64,
        #[serde(default = "default_numb_candi_f")]
        numb_candi_f: usize,
        #[serde(default = "default_rate_candi_f")]
        rate_candi_f: f64,
        #[serde(default)]
        level_v_hi: Option<f64>,
        #[serde(default)]
        numb_candi_v: usize,
        #[serde(default)]
        rate_candi_v: f64,
        #[serde(default = "default_n_checked_steps")]
        n_checked_steps: usize,
        #[serde(default = "default_conv_tolerance")]
        conv_tolerance: f64,
    },
}

fn default_conv_accuracy() -> f64 {
    0.9
}

fn default_numb_candi_f() -> usize {
    200
}

fn default_rate_candi_f() -> f64 {
    0.01
}

fn default_n_checked_steps() -> usize {
    2
}

fn default_conv_tolerance() -> f64 {
    0.05
}

/// MD task-group template of one exploration stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Human-readable stage name
    #[serde(default)]
    pub name: Option<String>,

    /// Thermodynamic ensemble (e.g. "nvt", "npt")
    #[serde(default = "default_ensemble")]
    pub ensemble: String,

    /// Temperatures (K)
    pub temps: Vec<f64>,

    /// Pressures (bar); empty for constant-volume ensembles
    #[serde(default)]
    pub press: Vec<f64>,

    /// MD steps per task
    #[serde(default = "default_nsteps")]
    pub nsteps: u64,

    /// Trajectory dump frequency
    #[serde(default = "default_trj_freq")]
    pub trj_freq: u64,

    /// Indices of initial configurations explored in this stage
    #[serde(default)]
    pub conf_idx: Vec<usize>,

    /// Per-stage override of `scheduler.max_numb_iter`
    #[serde(default)]
    pub max_numb_iter: Option<usize>,
}

fn default_ensemble() -> String {
    "nvt".to_string()
}

fn default_nsteps() -> u64 {
    1000
}

fn default_trj_freq() -> u64 {
    10
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::Invalid("at least one [[stages]] entry is required".into()));
        }
        for (idx, stage) in self.stages.iter().enumerate() {
            if stage.temps.is_empty() {
                return Err(ConfigError::Invalid(format!("stage {idx}: temps must not be empty")));
            }
        }

        match &self.convergence {
            ConvergenceConfig::FixedLevels {
                level_f_lo,
                level_f_hi,
                level_v_lo,
                level_v_hi,
                conv_accuracy,
            } => {
                check_levels("force", *level_f_lo, *level_f_hi)?;
                match (level_v_lo, level_v_hi) {
                    (Some(lo), Some(hi)) => check_levels("virial", *lo, *hi)?,
                    (None, None) => {}
                    _ => {
                        return Err(ConfigError::Invalid(
                            "level_v_lo and level_v_hi must be given together".into(),
                        ));
                    }
                }
                check_ratio("conv_accuracy", *conv_accuracy)?;
            }
            ConvergenceConfig::AdaptiveLower {
                rate_candi_f,
                rate_candi_v,
                n_checked_steps,
                conv_tolerance,
                ..
            } => {
                check_ratio("rate_candi_f", *rate_candi_f)?;
                check_ratio("rate_candi_v", *rate_candi_v)?;
                if *n_checked_steps < 2 {
                    return Err(ConfigError::Invalid(format!(
                        "n_checked_steps must be at least 2, got {n_checked_steps}"
                    )));
                }
                if *conv_tolerance <= 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "conv_tolerance must be positive, got {conv_tolerance}"
                    )));
                }
            }
        }

        Ok(())
    }
}

fn check_levels(what: &str, lo: f64, hi: f64) -> Result<(), ConfigError> {
    if lo > hi {
        return Err(ConfigError::Invalid(format!(
            "{what} trust level: lo ({lo}) must not exceed hi ({hi})"
        )));
    }
    Ok(())
}

fn check_ratio(what: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{what} must be within [0, 1], got {value}"
        )));
    }
    Ok(())
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Values out of range
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
[scheduler]
max_numb_iter = 5
fatal_at_max = false
max_selected_frames = 50
type_map = ["O", "H"]

[convergence]
type = "fixed-levels"
level_f_lo = 0.05
level_f_hi = 0.5
conv_accuracy = 0.95

[downsample]
policy = "random"
seed = 7

[[stages]]
temps = [300.0, 600.0]
nsteps = 2000
"#;

    #[test]
    fn test_parse_fixed_levels() {
        let config: Config = toml::from_str(EXAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.scheduler.max_numb_iter, 5);
        assert!(!config.scheduler.fatal_at_max);
        assert_eq!(config.downsample, DownsamplePolicy::Random { seed: Some(7) });
        assert_eq!(config.stages[0].ensemble, "nvt");
        match config.convergence {
            ConvergenceConfig::FixedLevels {
                level_v_lo,
                conv_accuracy,
                ..
            } => {
                assert!(level_v_lo.is_none());
                assert!((conv_accuracy - 0.95).abs() < 1e-12);
            }
            other => panic!("unexpected convergence config: {other:?}"),
        }
    }

    #[test]
    fn test_parse_adaptive_defaults() {
        let text = r#"
[scheduler]

[convergence]
type = "adaptive-lower"
level_f_hi = 0.6

[[stages]]
temps = [300.0]
"#;
        let config: Config = toml::from_str(text).unwrap();
        config.validate().unwrap();
        assert_eq!(config.downsample, DownsamplePolicy::MaxDeviation);
        match config.convergence {
            ConvergenceConfig::AdaptiveLower {
                numb_candi_f,
                n_checked_steps,
                level_v_hi,
                ..
            } => {
                assert_eq!(numb_candi_f, 200);
                assert_eq!(n_checked_steps, 2);
                assert!(level_v_hi.is_none());
            }
            other => panic!("unexpected convergence config: {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_inverted_levels() {
        let mut config: Config = toml::from_str(EXAMPLE).unwrap();
        config.convergence = ConvergenceConfig::FixedLevels {
            level_f_lo: 0.5,
            level_f_hi: 0.1,
            level_v_lo: None,
            level_v_hi: None,
            conv_accuracy: 0.9,
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_half_virial_pair() {
        let mut config: Config = toml::from_str(EXAMPLE).unwrap();
        config.convergence = ConvergenceConfig::FixedLevels {
            level_f_lo: 0.1,
            level_f_hi: 0.3,
            level_v_lo: Some(0.1),
            level_v_hi: None,
            conv_accuracy: 0.9,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_missing() {
        let err = Config::from_file(std::path::Path::new("/nonexistent/dpexplore.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}
