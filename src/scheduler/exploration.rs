//! Exploration scheduler - drive a run through its stages.
//!
//! K_i: The stage index never rewinds
//! K_i: Fatal errors leave here tagged with the stage index
//! I^R: Stages may be appended while the run is in progress

use super::progress::{self, ConvergenceRatio, IterationIndex};
use super::stage::{ConvergenceCheck, IterationPlan, StageScheduler, StageState};
use super::task::{ExplorationStage, StageTemplate};
use crate::models::{Config, ConvergenceConfig, ExploreError, Result};
use crate::report::ExplorationReport;
use crate::selector::{ConfSelector, TrajRender};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Plain-data state of an exploration run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplorationState {
    pub stages: Vec<StageState>,
    pub cur_stage: usize,
    /// Number of iterations planned over all stages
    pub planned_iterations: usize,
    pub complete: bool,
}

impl ExplorationState {
    fn stage_refs(&self) -> Vec<&StageState> {
        self.stages.iter().collect()
    }

    pub fn stage_of_iterations(&self) -> Vec<IterationIndex> {
        progress::stage_of_iterations(&self.stage_refs())
    }

    pub fn convergence_ratio(&self) -> Result<Vec<ConvergenceRatio>> {
        progress::convergence_ratio(&self.stage_refs())
    }

    pub fn print_convergence(&self) -> Result<String> {
        progress::format_convergence(&self.stage_refs())
    }
}

/// Scheduler owning the stage schedulers of a run, in execution order.
pub struct ExplorationScheduler<S: ExplorationStage, R: TrajRender> {
    stages: Vec<StageScheduler<S, R>>,
    cur_stage: usize,
    planned_iterations: usize,
    complete: bool,
}

impl<S: ExplorationStage, R: TrajRender> Default for ExplorationScheduler<S, R> {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            cur_stage: 0,
            planned_iterations: 0,
            complete: false,
        }
    }
}

impl<S: ExplorationStage, R: TrajRender> ExplorationScheduler<S, R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage. A completed run is reopened by a new stage.
    pub fn add_stage_scheduler(&mut self, stage: StageScheduler<S, R>) -> &mut Self {
        self.stages.push(stage);
        if self.complete {
            info!(stages = self.stages.len(), "Exploration extended with a new stage");
            self.complete = false;
        }
        self
    }

    pub fn stage_schedulers(&self) -> &[StageScheduler<S, R>] {
        &self.stages
    }

    /// Index of the current stage.
    pub fn get_stage(&self) -> usize {
        self.cur_stage
    }

    /// Index of the iteration planned last; `None` before the first plan.
    pub fn get_iteration(&self) -> Option<usize> {
        self.planned_iterations.checked_sub(1)
    }

    pub fn complete(&self) -> bool {
        self.complete
    }

    /// Complete the current stage without further planning and move on.
    pub fn force_stage_complete(&mut self) {
        if let Some(stage) = self.stages.get_mut(self.cur_stage) {
            warn!(stage = self.cur_stage, "Forcing stage completion");
            stage.force_complete();
            self.cur_stage += 1;
        }
        if self.cur_stage >= self.stages.len() {
            self.complete = true;
        }
    }

    /// Decide the next iteration of the run.
    ///
    /// The report is handed to the current stage. When that stage completes,
    /// the following stage is started in the same call; the run completes
    /// when no stage is left.
    pub fn plan_next_iteration(
        &mut self,
        report: Option<ExplorationReport>,
        trajs: Option<&[R::Traj]>,
    ) -> Result<IterationPlan<S::Task, R>> {
        if self.complete {
            return Err(ExploreError::ExplorationCompleted);
        }

        let mut report = report;
        let mut trajs = trajs;
        while let Some(stage) = self.stages.get_mut(self.cur_stage) {
            if stage.complete() {
                if report.take().is_some() {
                    warn!(stage = self.cur_stage, "Discarding report for a completed stage");
                }
                trajs = None;
                self.cur_stage += 1;
                continue;
            }

            let idx = self.cur_stage;
            let plan = stage
                .plan_next_iteration(report.take(), trajs.take())
                .map_err(|e| e.in_stage(idx))?;

            if plan.converged {
                info!(stage = idx, "Stage finished, moving to the next stage");
                self.cur_stage += 1;
                continue;
            }

            self.planned_iterations += 1;
            return Ok(plan);
        }

        info!(
            stages = self.stages.len(),
            iterations = self.planned_iterations,
            "All exploration stages complete"
        );
        self.complete = true;
        Ok(IterationPlan::complete())
    }

    /// Export the state as plain data.
    pub fn state(&self) -> ExplorationState {
        ExplorationState {
            stages: self.stages.iter().map(|s| s.state().clone()).collect(),
            cur_stage: self.cur_stage,
            planned_iterations: self.planned_iterations,
            complete: self.complete,
        }
    }

    /// Re-apply a saved state onto schedulers rebuilt from configuration.
    ///
    /// Stages beyond the saved ones stay fresh and reopen a completed run.
    pub fn restore(&mut self, state: ExplorationState) -> Result<()> {
        if state.stages.len() > self.stages.len() {
            return Err(ExploreError::Inconsistent(format!(
                "saved state has {} stages but only {} are configured",
                state.stages.len(),
                self.stages.len()
            )));
        }
        let saved = state.stages.len();
        for (scheduler, stage_state) in self.stages.iter_mut().zip(state.stages) {
            scheduler.restore(stage_state);
        }
        self.cur_stage = state.cur_stage;
        self.planned_iterations = state.planned_iterations;
        self.complete = state.complete && saved == self.stages.len();
        info!(
            stage = self.cur_stage,
            iterations = self.planned_iterations,
            "Restored exploration state"
        );
        Ok(())
    }

    fn stage_refs(&self) -> Vec<&StageState> {
        self.stages.iter().map(|s| s.state()).collect()
    }

    /// Global iteration → (stage, index in stage), for every reported iteration.
    pub fn get_stage_of_iterations(&self) -> Vec<IterationIndex> {
        progress::stage_of_iterations(&self.stage_refs())
    }

    /// Accurate / candidate / failed ratios of every reported iteration.
    pub fn get_convergence_ratio(&self) -> Result<Vec<ConvergenceRatio>> {
        progress::convergence_ratio(&self.stage_refs())
    }

    /// Progress line of the latest reported iteration.
    pub fn print_last_iteration(&self, print_header: bool) -> Result<String> {
        let Some(last) = self.get_stage_of_iterations().pop() else {
            return Ok(String::new());
        };
        let state = self.stages[last.stage].state();
        let report = &state.reports[last.idx_in_stage];
        let is_last = last.idx_in_stage + 1 == state.reports.len();
        let row = report.print_row(
            last.stage,
            last.idx_in_stage,
            last.iteration,
            is_last && state.converged,
        )?;
        Ok(if print_header {
            format!("{}\n{}", report.print_header(), row)
        } else {
            row
        })
    }

    /// Full progress table of the run.
    pub fn print_convergence(&self) -> Result<String> {
        progress::format_convergence(&self.stage_refs())
    }
}

impl<R: TrajRender> ExplorationScheduler<StageTemplate, R> {
    /// Build one stage scheduler per `[[stages]]` entry.
    ///
    /// Every stage shares the report template and the render.
    pub fn from_config(config: &Config, render: Arc<R>) -> Self {
        let report = ExplorationReport::from_config(&config.convergence, config.downsample);
        let check = match &config.convergence {
            ConvergenceConfig::FixedLevels { conv_accuracy, .. } => {
                ConvergenceCheck::AccurateRatio(*conv_accuracy)
            }
            ConvergenceConfig::AdaptiveLower { .. } => ConvergenceCheck::Report,
        };

        let mut sched = Self::new();
        for (idx, stage) in config.stages.iter().enumerate() {
            let selector = ConfSelector::new(
                Arc::clone(&render),
                report.clone(),
                config.scheduler.max_selected_frames,
            );
            sched.add_stage_scheduler(StageScheduler::new(
                StageTemplate::from_config(idx, stage),
                selector,
                check,
                Some(stage.max_numb_iter.unwrap_or(config.scheduler.max_numb_iter)),
                config.scheduler.fatal_at_max,
            ));
        }
        sched
    }
}
