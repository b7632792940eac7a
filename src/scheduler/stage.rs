//! Stage scheduler - iterate one stage until it converges.
//!
//! K_i: Counters only increase; a complete stage never plans again
//! K_i: Every planned iteration keeps exactly one report in the history
//! B_i: No candidate while unconverged → fatal, the model cannot improve
//! K_i: A stage stopped by a fatal error stays open; only a resubmitted
//!      report can move it on

use super::task::ExplorationStage;
use crate::models::{ExploreError, Result};
use crate::report::ExplorationReport;
use crate::selector::{ConfSelector, TrajRender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// How a stage decides it has converged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConvergenceCheck {
    /// Accurate ratio at least this value
    AccurateRatio(f64),
    /// Defer to the report (adaptive flavour uses the stage history)
    Report,
}

/// Lifecycle of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    NotStarted,
    Iterating,
    Converged,
    ForcedComplete,
    /// Stopped by a fatal error, waiting for a resubmitted report
    Stopped,
}

/// Plain-data state of a stage scheduler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageState {
    /// Number of task groups planned so far
    pub next_iteration: usize,
    pub converged: bool,
    pub reached_max_iteration: bool,
    #[serde(default)]
    pub forced_complete: bool,
    /// Message of the fatal error that stopped the last iteration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
    /// Reports received, oldest first
    pub reports: Vec<ExplorationReport>,
}

impl StageState {
    pub fn complete(&self) -> bool {
        self.converged || self.reached_max_iteration || self.forced_complete
    }

    pub fn status(&self) -> StageStatus {
        if self.converged {
            StageStatus::Converged
        } else if self.reached_max_iteration || self.forced_complete {
            StageStatus::ForcedComplete
        } else if self.fatal.is_some() {
            StageStatus::Stopped
        } else if self.next_iteration == 0 {
            StageStatus::NotStarted
        } else {
            StageStatus::Iterating
        }
    }
}

/// Outcome of planning one iteration.
pub struct IterationPlan<T, R: TrajRender> {
    /// The stage (or the whole exploration) is complete
    pub converged: bool,
    /// Next MD task group, if not complete
    pub task_group: Option<T>,
    /// Selector for the next iteration, if not complete
    pub selector: Option<ConfSelector<R>>,
}

impl<T, R: TrajRender> IterationPlan<T, R> {
    /// Plan signalling completion.
    pub fn complete() -> Self {
        Self {
            converged: true,
            task_group: None,
            selector: None,
        }
    }

    fn next(task_group: T, selector: ConfSelector<R>) -> Self {
        Self {
            converged: false,
            task_group: Some(task_group),
            selector: Some(selector),
        }
    }
}

/// Scheduler of one exploration stage.
pub struct StageScheduler<S: ExplorationStage, R: TrajRender> {
    stage: S,
    selector: ConfSelector<R>,
    check: ConvergenceCheck,
    max_numb_iter: Option<usize>,
    fatal_at_max: bool,
    state: StageState,
}

impl<S: ExplorationStage, R: TrajRender> StageScheduler<S, R> {
    pub fn new(
        stage: S,
        selector: ConfSelector<R>,
        check: ConvergenceCheck,
        max_numb_iter: Option<usize>,
        fatal_at_max: bool,
    ) -> Self {
        Self {
            stage,
            selector,
            check,
            max_numb_iter,
            fatal_at_max,
            state: StageState::default(),
        }
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub fn selector(&self) -> &ConfSelector<R> {
        &self.selector
    }

    pub fn state(&self) -> &StageState {
        &self.state
    }

    /// Replace the state, e.g. when resuming a run.
    pub fn restore(&mut self, state: StageState) {
        self.state = state;
    }

    pub fn next_iteration(&self) -> usize {
        self.state.next_iteration
    }

    pub fn converged(&self) -> bool {
        self.state.converged
    }

    pub fn reached_max_iteration(&self) -> bool {
        self.state.reached_max_iteration
    }

    pub fn complete(&self) -> bool {
        self.state.complete()
    }

    pub fn status(&self) -> StageStatus {
        self.state.status()
    }

    pub fn reports(&self) -> &[ExplorationReport] {
        &self.state.reports
    }

    /// Mark the stage complete without further planning.
    pub fn force_complete(&mut self) {
        self.state.forced_complete = true;
    }

    /// Decide the next step of this stage.
    ///
    /// `report` is `None` on the first call; afterwards it is the report of
    /// the iteration planned last. After a fatal error the same iteration may
    /// be reported again; the new report replaces the one that stopped it.
    pub fn plan_next_iteration(
        &mut self,
        report: Option<ExplorationReport>,
        trajs: Option<&[R::Traj]>,
    ) -> Result<IterationPlan<S::Task, R>> {
        if self.complete() {
            return Err(ExploreError::StageCompleted);
        }
        if let Some(trajs) = trajs {
            debug!(ntraj = trajs.len(), "Planning with explored trajectories");
        }

        let report = match report {
            None => {
                self.state.fatal = None;
                self.state.converged = false;
                return self.next_plan();
            }
            Some(report) => report,
        };

        let history = match self.state.fatal {
            Some(_) => self.state.reports.split_last().map_or(&[][..], |(_, rest)| rest),
            None => &self.state.reports[..],
        };
        let mut complete = match self.check {
            ConvergenceCheck::AccurateRatio(conv_accuracy) => {
                report.accurate_ratio()? >= conv_accuracy
            }
            ConvergenceCheck::Report => report.converged(history)?,
        };
        let no_candidate = report.no_candidate()?;

        if let Some(reason) = self.state.fatal.take() {
            self.state.reports.pop();
            info!(
                iteration = self.state.next_iteration,
                reason = %reason,
                "Retrying iteration stopped by a fatal error"
            );
        }
        self.state.converged = complete;
        self.state.reports.push(report);

        if !complete {
            if no_candidate {
                return Err(self.stop(
                    "The iteration does not select any candidate configuration. \
                     The model quality cannot be improved; \
                     consider adjusting the trust levels.",
                ));
            }
            if self
                .max_numb_iter
                .is_some_and(|max| self.state.next_iteration >= max)
            {
                if self.fatal_at_max {
                    return Err(self.stop("reached maximal number of iterations"));
                }
                self.state.reached_max_iteration = true;
                warn!(
                    iterations = self.state.next_iteration,
                    "Stage reached maximal number of iterations, forcing completion"
                );
                complete = true;
            }
        }

        if complete {
            info!(
                iterations = self.state.next_iteration,
                converged = self.state.converged,
                "Stage complete"
            );
            return Ok(IterationPlan::complete());
        }
        self.next_plan()
    }

    fn stop(&mut self, message: &str) -> ExploreError {
        self.state.fatal = Some(message.to_string());
        ExploreError::fatal(message)
    }

    fn next_plan(&mut self) -> Result<IterationPlan<S::Task, R>> {
        let task_group = self.stage.make_task()?;
        self.state.next_iteration += 1;
        Ok(IterationPlan::next(task_group, self.selector.clone()))
    }
}
