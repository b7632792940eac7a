//! Progress reconstruction from stage histories.

use super::stage::StageState;
use crate::models::Result;
use serde::{Deserialize, Serialize};

/// Position of a global iteration inside the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationIndex {
    pub stage: usize,
    pub idx_in_stage: usize,
    pub iteration: usize,
}

/// Frame ratios of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceRatio {
    pub accurate: f64,
    pub candidate: f64,
    pub failed: f64,
}

/// Map every reported iteration to its stage and index within the stage.
pub fn stage_of_iterations(stages: &[&StageState]) -> Vec<IterationIndex> {
    let cumsum: Vec<usize> = stages
        .iter()
        .scan(0, |acc, s| {
            *acc += s.reports.len();
            Some(*acc)
        })
        .collect();
    let total = cumsum.last().copied().unwrap_or(0);

    (0..total)
        .map(|iteration| {
            let stage = cumsum.partition_point(|&c| c <= iteration);
            let start = if stage == 0 { 0 } else { cumsum[stage - 1] };
            IterationIndex {
                stage,
                idx_in_stage: iteration - start,
                iteration,
            }
        })
        .collect()
}

/// Accurate / candidate / failed ratios of every reported iteration.
pub fn convergence_ratio(stages: &[&StageState]) -> Result<Vec<ConvergenceRatio>> {
    stage_of_iterations(stages)
        .into_iter()
        .map(|idx| {
            let report = &stages[idx.stage].reports[idx.idx_in_stage];
            Ok(ConvergenceRatio {
                accurate: report.accurate_ratio()?,
                candidate: report.candidate_ratio()?,
                failed: report.failed_ratio()?,
            })
        })
        .collect()
}

/// Progress table: a header per stage, one row per iteration and a
/// trailing line for every completed or stopped stage.
pub fn format_convergence(stages: &[&StageState]) -> Result<String> {
    let mut lines = Vec::new();
    for idx in stage_of_iterations(stages) {
        let state = stages[idx.stage];
        let report = &state.reports[idx.idx_in_stage];
        let is_last = idx.idx_in_stage + 1 == state.reports.len();

        if idx.idx_in_stage == 0 {
            lines.push(report.print_header());
        }
        lines.push(report.print_row(
            idx.stage,
            idx.idx_in_stage,
            idx.iteration,
            is_last && state.converged,
        )?);

        if is_last {
            if state.converged {
                lines.push(format!("# Stage {:4}  converged", idx.stage));
            } else if state.reached_max_iteration {
                lines.push(format!(
                    "# Stage {:4}  reached the maximal number of iterations",
                    idx.stage
                ));
            } else if state.forced_complete {
                lines.push(format!("# Stage {:4}  forced complete", idx.stage));
            } else if let Some(reason) = &state.fatal {
                lines.push(format!("# Stage {:4}  stopped: {}", idx.stage, reason));
            }
        }
    }
    Ok(lines.join("\n"))
}
