//! Exploration reports - classify sampled frames and judge convergence.
//!
//! Two flavours share one interface:
//! - `ReportTrustLevels`: fixed (lo, hi) trust levels
//! - `ReportAdaptiveLower`: fixed hi, lower level adapted to a candidate budget
//!
//! Candidate downsampling is a `DownsamplePolicy` value injected at
//! construction.

mod adaptive;
mod classification;
mod downsample;
mod trust_levels;

pub use adaptive::*;
pub use classification::*;
pub use downsample::*;
pub use trust_levels::*;

use crate::models::{ConvergenceConfig, DeviationChannel, DeviationStore, ExploreError, Result};
use serde::{Deserialize, Serialize};

/// Report of one exploration iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ExplorationReport {
    TrustLevels(ReportTrustLevels),
    AdaptiveLower(ReportAdaptiveLower),
}

impl ExplorationReport {
    /// Build an empty report from the convergence configuration.
    pub fn from_config(config: &ConvergenceConfig, downsample: DownsamplePolicy) -> Self {
        match config {
            ConvergenceConfig::FixedLevels {
                level_f_lo,
                level_f_hi,
                level_v_lo,
                level_v_hi,
                conv_accuracy,
            } => {
                let mut trust = TrustLevel::new(*level_f_lo, *level_f_hi);
                if let (Some(lo), Some(hi)) = (level_v_lo, level_v_hi) {
                    trust = trust.with_virial(*lo, *hi);
                }
                Self::TrustLevels(ReportTrustLevels::new(trust, *conv_accuracy, downsample))
            }
            ConvergenceConfig::AdaptiveLower {
                level_f_hi,
                numb_candi_f,
                rate_candi_f,
                level_v_hi,
                numb_candi_v,
                rate_candi_v,
                n_checked_steps,
                conv_tolerance,
            } => Self::AdaptiveLower(ReportAdaptiveLower::new(
                CandidateBudget::new(*level_f_hi, *numb_candi_f, *rate_candi_f),
                level_v_hi.map(|hi| CandidateBudget::new(hi, *numb_candi_v, *rate_candi_v)),
                LevelConvergence {
                    n_checked_steps: *n_checked_steps,
                    conv_tolerance: *conv_tolerance,
                },
                downsample,
            )),
        }
    }

    /// Classify the frames in `store`, replacing any previous result.
    pub fn record(&mut self, store: &DeviationStore) -> Result<()> {
        match self {
            Self::TrustLevels(r) => r.record(store),
            Self::AdaptiveLower(r) => r.record(store),
        }
    }

    /// Drop the classification.
    pub fn clear(&mut self) {
        match self {
            Self::TrustLevels(r) => r.clear(),
            Self::AdaptiveLower(r) => r.clear(),
        }
    }

    /// Classification of the last record, if any.
    pub fn classification(&self) -> Option<&FrameClassification> {
        match self {
            Self::TrustLevels(r) => r.classification(),
            Self::AdaptiveLower(r) => r.classification(),
        }
    }

    fn recorded(&self) -> Result<&FrameClassification> {
        self.classification().ok_or(ExploreError::ReportNotRecorded)
    }

    pub fn accurate_ratio(&self) -> Result<f64> {
        Ok(self.recorded()?.accurate_ratio())
    }

    pub fn candidate_ratio(&self) -> Result<f64> {
        Ok(self.recorded()?.candidate_ratio())
    }

    pub fn failed_ratio(&self) -> Result<f64> {
        Ok(self.recorded()?.failed_ratio())
    }

    /// True when no frame was classified as candidate.
    pub fn no_candidate(&self) -> Result<bool> {
        Ok(self.recorded()?.num_candidate() == 0)
    }

    /// Convergence of this report given the earlier reports of its stage.
    ///
    /// Fixed trust levels ignore `history`.
    pub fn converged(&self, history: &[ExplorationReport]) -> Result<bool> {
        match self {
            Self::TrustLevels(r) => Ok(self.accurate_ratio()? >= r.conv_accuracy()),
            Self::AdaptiveLower(r) => r.converged(history),
        }
    }

    /// Candidate frame ids per trajectory, at most `max_nframes` in total.
    pub fn get_candidate_ids(&self, max_nframes: usize) -> Result<Vec<Vec<usize>>> {
        let policy = match self {
            Self::TrustLevels(r) => r.downsample(),
            Self::AdaptiveLower(r) => r.downsample(),
        };
        Ok(self.recorded()?.candidate_ids(max_nframes, policy))
    }

    /// Force trust level (lo, hi); lo is the realised level for the
    /// adaptive flavour.
    pub fn level_f(&self) -> (f64, f64) {
        match self {
            Self::TrustLevels(r) => {
                let t = r.trust_level();
                (t.level_f_lo, t.level_f_hi)
            }
            Self::AdaptiveLower(r) => (r.level_f_lo(), r.force_budget().level_hi),
        }
    }

    /// Virial trust level (lo, hi), if virial is checked.
    pub fn level_v(&self) -> Option<(f64, f64)> {
        match self {
            Self::TrustLevels(r) => r.trust_level().level_v,
            Self::AdaptiveLower(r) => r
                .virial_budget()
                .map(|b| (r.level_v_lo().unwrap_or(b.level_hi), b.level_hi)),
        }
    }

    /// Column header matching `print_row`.
    pub fn print_header(&self) -> String {
        let mut line = format!(
            "#{:>7} {:>7} {:>7} {:>9} {:>9} {:>9} {:>10} {:>10}",
            "stage", "id_stg.", "iter.", "accu.", "cand.", "fail.", "lvl_f_lo", "lvl_f_hi"
        );
        if self.level_v().is_some() {
            line.push_str(&format!(" {:>10} {:>10}", "lvl_v_lo", "lvl_v_hi"));
        }
        line.push_str(&format!(" {:>5}", "conv"));
        line
    }

    /// One progress line: ratios in percent, trust levels and convergence.
    pub fn print_row(
        &self,
        stage_idx: usize,
        idx_in_stage: usize,
        iter_idx: usize,
        converged: bool,
    ) -> Result<String> {
        let cls = self.recorded()?;
        let (f_lo, f_hi) = self.level_f();
        let mut line = format!(
            " {:>7} {:>7} {:>7} {:>8.2}% {:>8.2}% {:>8.2}% {:>10.4} {:>10.4}",
            stage_idx,
            idx_in_stage,
            iter_idx,
            cls.accurate_ratio() * 100.0,
            cls.candidate_ratio() * 100.0,
            cls.failed_ratio() * 100.0,
            f_lo,
            f_hi
        );
        if let Some((v_lo, v_hi)) = self.level_v() {
            line.push_str(&format!(" {v_lo:>10.4} {v_hi:>10.4}"));
        }
        line.push_str(&format!(" {:>5}", converged));
        Ok(line)
    }
}

/// Force deviations and (optional) virial deviations per trajectory.
///
/// Fails if `max_devi_f` is missing for any trajectory.
pub(crate) fn force_and_virial(
    store: &DeviationStore,
) -> Result<(Vec<&[f64]>, Vec<Option<&[f64]>>)> {
    let md_f = store
        .get(DeviationChannel::MaxDeviF)?
        .into_iter()
        .enumerate()
        .map(|(traj, f)| f.ok_or(ExploreError::MissingMaxDeviF { traj }))
        .collect::<Result<Vec<_>>>()?;
    let md_v = store.get(DeviationChannel::MaxDeviV)?;
    Ok((md_f, md_v))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_store() -> DeviationStore {
        let mut store = DeviationStore::new();
        store.add(DeviationChannel::MaxDeviF, vec![0.05, 0.2, 0.5]);
        store.add(DeviationChannel::MaxDeviF, vec![0.25]);
        store
    }

    fn fixed(conv_accuracy: f64) -> ExplorationReport {
        ExplorationReport::from_config(
            &ConvergenceConfig::FixedLevels {
                level_f_lo: 0.1,
                level_f_hi: 0.3,
                level_v_lo: None,
                level_v_hi: None,
                conv_accuracy,
            },
            DownsamplePolicy::MaxDeviation,
        )
    }

    #[test]
    fn test_ratios_before_record() {
        let report = fixed(0.9);
        assert!(matches!(report.accurate_ratio(), Err(ExploreError::ReportNotRecorded)));
        assert!(report.get_candidate_ids(10).is_err());
    }

    #[test]
    fn test_scenario_ratios_and_convergence() {
        let mut report = fixed(0.2);
        report.record(&scenario_store()).unwrap();
        assert!((report.accurate_ratio().unwrap() - 0.25).abs() < 1e-12);
        assert!((report.candidate_ratio().unwrap() - 0.5).abs() < 1e-12);
        assert!((report.failed_ratio().unwrap() - 0.25).abs() < 1e-12);
        assert!(report.converged(&[]).unwrap());

        let mut strict = fixed(0.9);
        strict.record(&scenario_store()).unwrap();
        assert!(!strict.converged(&[report.clone()]).unwrap());
    }

    #[test]
    fn test_ratios_sum_to_one() {
        let mut store = DeviationStore::new();
        store.add(DeviationChannel::MaxDeviF, (0..37).map(|i| i as f64 * 0.013).collect());
        store.add(DeviationChannel::MaxDeviF, (0..11).map(|i| 0.5 - i as f64 * 0.04).collect());
        for mut report in [
            fixed(0.9),
            ExplorationReport::from_config(
                &ConvergenceConfig::AdaptiveLower {
                    level_f_hi: 0.4,
                    numb_candi_f: 3,
                    rate_candi_f: 0.1,
                    level_v_hi: None,
                    numb_candi_v: 0,
                    rate_candi_v: 0.0,
                    n_checked_steps: 2,
                    conv_tolerance: 0.05,
                },
                DownsamplePolicy::MaxDeviation,
            ),
        ] {
            report.record(&store).unwrap();
            let sum = report.accurate_ratio().unwrap()
                + report.candidate_ratio().unwrap()
                + report.failed_ratio().unwrap();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_candidate_ids_capped_and_valid() {
        let mut store = DeviationStore::new();
        store.add(DeviationChannel::MaxDeviF, vec![0.11, 0.29, 0.05, 0.9]);
        store.add(DeviationChannel::MaxDeviF, vec![0.15, 0.27, 0.2, 0.12]);
        for policy in [DownsamplePolicy::MaxDeviation, DownsamplePolicy::Random { seed: Some(3) }] {
            let mut report = ExplorationReport::TrustLevels(ReportTrustLevels::new(
                TrustLevel::new(0.1, 0.3),
                0.9,
                policy,
            ));
            report.record(&store).unwrap();
            let cls = report.classification().unwrap();
            for k in 0..8 {
                let ids = report.get_candidate_ids(k).unwrap();
                assert_eq!(ids.len(), 2);
                let total: usize = ids.iter().map(Vec::len).sum();
                assert_eq!(total, k.min(6));
                for (traj, frames) in ids.iter().enumerate() {
                    for frame in frames {
                        assert_eq!(cls.class_of((traj, *frame)), Some(FrameClass::Candidate));
                    }
                }
            }
        }
    }

    #[test]
    fn test_max_deviation_picks_two_highest() {
        let mut store = DeviationStore::new();
        store.add(DeviationChannel::MaxDeviF, vec![0.11, 0.29, 0.05, 0.9]);
        store.add(DeviationChannel::MaxDeviF, vec![0.15, 0.27, 0.2, 0.12]);
        let mut report = fixed(0.9);
        report.record(&store).unwrap();
        for _ in 0..5 {
            assert_eq!(report.get_candidate_ids(2).unwrap(), vec![vec![1], vec![1]]);
        }
    }

    #[test]
    fn test_print_row_columns() {
        let mut report = fixed(0.9);
        report.record(&scenario_store()).unwrap();
        let row = report.print_row(1, 2, 7, false).unwrap();
        assert!(row.contains("25.00%"));
        assert!(row.contains("50.00%"));
        assert!(row.contains("0.1000"));
        assert!(row.trim_end().ends_with("false"));
        assert!(report.print_header().contains("lvl_f_hi"));
        assert!(!report.print_header().contains("lvl_v_lo"));
    }

    #[test]
    fn test_report_serde_keeps_ratios() {
        let mut report = fixed(0.9);
        report.record(&scenario_store()).unwrap();
        let json = serde_json::to_string(&report).unwrap();
        let restored: ExplorationReport = serde_json::from_str(&json).unwrap();
        assert!((restored.candidate_ratio().unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(restored.level_f(), (0.1, 0.3));
    }
}
