//! Stage templates and the MD task groups they expand into.

use crate::models::{ConfigError, ExploreError, Result, StageConfig};
use serde::{Deserialize, Serialize};

/// A fixed sampling regime that can produce its next MD task group.
pub trait ExplorationStage {
    type Task;

    fn make_task(&self) -> Result<Self::Task>;
}

/// One MD run to launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MdTask {
    pub ensemble: String,
    pub temp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub press: Option<f64>,
    pub nsteps: u64,
    pub trj_freq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conf_idx: Option<usize>,
}

/// Task group of one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub stage: String,
    pub tasks: Vec<MdTask>,
}

impl TaskGroup {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Config-driven stage: the cartesian product of initial configurations,
/// temperatures and pressures.
#[derive(Debug, Clone)]
pub struct StageTemplate {
    name: String,
    config: StageConfig,
}

impl StageTemplate {
    pub fn new(name: impl Into<String>, config: StageConfig) -> Self {
        Self {
            name: name.into(),
            config,
        }
    }

    /// Build a template, naming it after its position if unnamed.
    pub fn from_config(idx: usize, config: &StageConfig) -> Self {
        let name = config
            .name
            .clone()
            .unwrap_or_else(|| format!("stage-{idx:03}"));
        Self::new(name, config.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }
}

impl ExplorationStage for StageTemplate {
    type Task = TaskGroup;

    fn make_task(&self) -> Result<TaskGroup> {
        let cfg = &self.config;
        let constant_pressure = cfg.ensemble.to_lowercase().starts_with("np");
        if constant_pressure && cfg.press.is_empty() {
            return Err(ExploreError::Config(ConfigError::Invalid(format!(
                "stage '{}': ensemble {} needs at least one pressure",
                self.name, cfg.ensemble
            ))));
        }

        let confs: Vec<Option<usize>> = if cfg.conf_idx.is_empty() {
            vec![None]
        } else {
            cfg.conf_idx.iter().copied().map(Some).collect()
        };
        let press: Vec<Option<f64>> = if constant_pressure {
            cfg.press.iter().copied().map(Some).collect()
        } else {
            vec![None]
        };

        let mut tasks = Vec::with_capacity(confs.len() * cfg.temps.len() * press.len());
        for conf_idx in &confs {
            for temp in &cfg.temps {
                for p in &press {
                    tasks.push(MdTask {
                        ensemble: cfg.ensemble.clone(),
                        temp: *temp,
                        press: *p,
                        nsteps: cfg.nsteps,
                        trj_freq: cfg.trj_freq,
                        conf_idx: *conf_idx,
                    });
                }
            }
        }

        Ok(TaskGroup {
            stage: self.name.clone(),
            tasks,
        })
    }
}
