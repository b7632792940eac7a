//! Exploration report with an adaptive lower trust level.
//!
//! The upper level is fixed. On every record the lower level is moved so
//! that a bounded number of the most uncertain non-failed frames become
//! candidates:
//!
//! N = max(numb_candi, floor(rate_candi × frames below hi))
//!
//! The realised lower level is the deviation of the N-th selected frame
//! (hi itself when N = 0). Force and virial are handled independently and
//! their candidate sets are merged.

use super::classification::{FrameClass, FrameClassification};
use super::downsample::DownsamplePolicy;
use super::{ExplorationReport, force_and_virial};
use crate::models::{DeviationStore, ExploreError, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Candidate budget for one deviation quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateBudget {
    pub level_hi: f64,
    pub numb_candi: usize,
    pub rate_candi: f64,
}

impl CandidateBudget {
    pub fn new(level_hi: f64, numb_candi: usize, rate_candi: f64) -> Self {
        Self {
            level_hi,
            numb_candi,
            rate_candi,
        }
    }

    /// Number of candidates to take out of `n_below_hi` eligible frames.
    pub fn numb_selected(&self, n_below_hi: usize) -> usize {
        let by_rate = (self.rate_candi * n_below_hi as f64).floor() as usize;
        self.numb_candi.max(by_rate).min(n_below_hi)
    }
}

/// Convergence settings of the adaptive lower level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelConvergence {
    pub n_checked_steps: usize,
    pub conv_tolerance: f64,
}

/// Report with fixed upper and adaptive lower trust level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportAdaptiveLower {
    force: CandidateBudget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    virial: Option<CandidateBudget>,
    convergence: LevelConvergence,
    downsample: DownsamplePolicy,
    level_f_lo: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    level_v_lo: Option<f64>,
    #[serde(default)]
    classification: Option<FrameClassification>,
}

impl ReportAdaptiveLower {
    pub fn new(
        force: CandidateBudget,
        virial: Option<CandidateBudget>,
        convergence: LevelConvergence,
        downsample: DownsamplePolicy,
    ) -> Self {
        Self {
            level_f_lo: force.level_hi,
            level_v_lo: virial.map(|v| v.level_hi),
            force,
            virial,
            convergence,
            downsample,
            classification: None,
        }
    }

    pub fn force_budget(&self) -> &CandidateBudget {
        &self.force
    }

    pub fn virial_budget(&self) -> Option<&CandidateBudget> {
        self.virial.as_ref()
    }

    pub fn level_convergence(&self) -> &LevelConvergence {
        &self.convergence
    }

    pub fn downsample(&self) -> &DownsamplePolicy {
        &self.downsample
    }

    /// Realised lower force level of the last record.
    pub fn level_f_lo(&self) -> f64 {
        self.level_f_lo
    }

    /// Realised lower virial level of the last record.
    pub fn level_v_lo(&self) -> Option<f64> {
        self.level_v_lo
    }

    pub fn classification(&self) -> Option<&FrameClassification> {
        self.classification.as_ref()
    }

    /// Classify every frame and recompute the lower level(s).
    pub fn record(&mut self, store: &DeviationStore) -> Result<()> {
        let (md_f, md_v) = force_and_virial(store)?;
        let level_v_hi = self.virial.map(|v| v.level_hi);

        let mut labels: Vec<Vec<FrameClass>> = Vec::with_capacity(md_f.len());
        let mut coll_f: Vec<(f64, usize, usize)> = Vec::new();
        let mut coll_v: Vec<(f64, usize, usize)> = Vec::new();

        for (traj, (f, v)) in md_f.iter().zip(&md_v).enumerate() {
            let mut traj_labels = Vec::with_capacity(f.len());
            for (frame, devi_f) in f.iter().enumerate() {
                let devi_v = v.map_or(0.0, |v| v[frame]);
                let failed_v = level_v_hi.is_some_and(|hi| devi_v >= hi);
                if *devi_f >= self.force.level_hi || failed_v {
                    traj_labels.push(FrameClass::Failed);
                } else {
                    traj_labels.push(FrameClass::Accurate);
                    coll_f.push((*devi_f, traj, frame));
                    if level_v_hi.is_some() {
                        coll_v.push((devi_v, traj, frame));
                    }
                }
            }
            labels.push(traj_labels);
        }

        self.level_f_lo = select_top(&mut coll_f, &self.force, &mut labels);
        self.level_v_lo = self
            .virial
            .map(|budget| select_top(&mut coll_v, &budget, &mut labels));

        let classification = FrameClassification::new(labels, &md_f);
        debug!(
            ntraj = md_f.len(),
            level_f_lo = self.level_f_lo,
            level_v_lo = ?self.level_v_lo,
            candidate = classification.num_candidate(),
            failed = classification.num_failed(),
            "Recorded model deviation with adaptive lower level"
        );
        self.classification = Some(classification);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.classification = None;
        self.level_f_lo = self.force.level_hi;
        self.level_v_lo = self.virial.map(|v| v.level_hi);
    }

    /// Whether the lower level(s) settled over the last `n_checked_steps`
    /// reports, this one included.
    ///
    /// `history` holds the earlier reports of the stage, oldest first.
    pub fn converged(&self, history: &[ExplorationReport]) -> Result<bool> {
        if self.classification.is_none() {
            return Err(ExploreError::ReportNotRecorded);
        }
        let previous: Vec<&ReportAdaptiveLower> = history
            .iter()
            .filter_map(|r| match r {
                ExplorationReport::AdaptiveLower(r) if r.classification.is_some() => Some(r),
                _ => None,
            })
            .collect();

        let levels_f: Vec<f64> = previous
            .iter()
            .map(|r| r.level_f_lo)
            .chain(std::iter::once(self.level_f_lo))
            .collect();
        if !self.window_settled(&levels_f) {
            return Ok(false);
        }

        if let Some(level_v_lo) = self.level_v_lo {
            let levels_v: Vec<f64> = previous
                .iter()
                .filter_map(|r| r.level_v_lo)
                .chain(std::iter::once(level_v_lo))
                .collect();
            if !self.window_settled(&levels_v) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn window_settled(&self, levels: &[f64]) -> bool {
        let n = self.convergence.n_checked_steps;
        if levels.len() < n {
            return false;
        }
        levels[levels.len() - n..]
            .windows(2)
            .all(|w| (w[0] - w[1]).abs() < self.convergence.conv_tolerance)
    }
}

/// Mark the most uncertain eligible frames as candidates.
///
/// Returns the realised lower level.
fn select_top(
    coll: &mut [(f64, usize, usize)],
    budget: &CandidateBudget,
    labels: &mut [Vec<FrameClass>],
) -> f64 {
    coll.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| (a.1, a.2).cmp(&(b.1, b.2))));
    let n = budget.numb_selected(coll.len());
    for (_, traj, frame) in &coll[..n] {
        labels[*traj][*frame] = FrameClass::Candidate;
    }
    match n {
        0 => budget.level_hi,
        n => coll[n - 1].0,
    }
}
