//! Configuration selection - turn a classification into labeling tasks.
//!
//! Flow:
//! model deviations → Report.record → candidate ids (capped) → configurations
//!
//! K_i: At most `max_selected_frames` frames leave the selector per iteration
//! I^R: Rendering and filtering are pluggable

mod filter;
mod render;

pub use filter::*;
pub use render::*;

use crate::models::Result;
use crate::report::ExplorationReport;
use std::sync::Arc;
use tracing::info;

/// Selects configurations for labeling from explored trajectories.
pub struct ConfSelector<R: TrajRender> {
    render: Arc<R>,
    report: ExplorationReport,
    max_selected_frames: usize,
    filters: ConfFilters<R::Conf>,
}

impl<R: TrajRender> Clone for ConfSelector<R> {
    fn clone(&self) -> Self {
        Self {
            render: Arc::clone(&self.render),
            report: self.report.clone(),
            max_selected_frames: self.max_selected_frames,
            filters: self.filters.clone(),
        }
    }
}

impl<R: TrajRender> ConfSelector<R> {
    /// Create a selector.
    ///
    /// `report` is used as a template; every `select` starts from a cleared
    /// copy of it.
    pub fn new(render: Arc<R>, report: ExplorationReport, max_selected_frames: usize) -> Self {
        Self {
            render,
            report,
            max_selected_frames,
            filters: ConfFilters::new(),
        }
    }

    /// Replace the post-selection filters.
    pub fn with_filters(mut self, filters: ConfFilters<R::Conf>) -> Self {
        self.filters = filters;
        self
    }

    pub fn max_selected_frames(&self) -> usize {
        self.max_selected_frames
    }

    pub fn report_template(&self) -> &ExplorationReport {
        &self.report
    }

    pub fn render(&self) -> &R {
        &self.render
    }

    /// Classify the explored frames and pick the ones to label.
    ///
    /// Returns the selected configurations and the populated report.
    pub fn select(
        &self,
        trajs: &[R::Traj],
        model_devis: &[R::DeviSource],
        type_map: &[String],
    ) -> Result<(Vec<R::Conf>, ExplorationReport)> {
        let store = self.render.get_model_devi(model_devis)?;

        let mut report = self.report.clone();
        report.clear();
        report.record(&store)?;

        let ids = report.get_candidate_ids(self.max_selected_frames)?;
        let picked: usize = ids.iter().map(Vec::len).sum();
        let confs = self.render.get_confs(trajs, &ids, type_map)?;
        let confs = self.filters.apply(confs);

        info!(
            ntraj = store.ntraj(),
            accurate = format!("{:.1}%", report.accurate_ratio()? * 100.0),
            candidate = format!("{:.1}%", report.candidate_ratio()? * 100.0),
            failed = format!("{:.1}%", report.failed_ratio()? * 100.0),
            picked,
            selected = confs.len(),
            "Selected configurations for labeling"
        );

        Ok((confs, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviationChannel, DeviationStore};
    use crate::report::{DownsamplePolicy, ReportTrustLevels, TrustLevel};

    /// Render over in-memory deviations; trajectories are names.
    struct MemoryRender;

    impl TrajRender for MemoryRender {
        type Traj = String;
        type DeviSource = Vec<f64>;
        type Conf = (String, usize);

        fn get_model_devi(&self, sources: &[Vec<f64>]) -> Result<DeviationStore> {
            let mut store = DeviationStore::new();
            for s in sources {
                store.add(DeviationChannel::MaxDeviF, s.clone());
            }
            Ok(store)
        }

        fn get_confs(
            &self,
            trajs: &[String],
            id_selected: &[Vec<usize>],
            _type_map: &[String],
        ) -> Result<Vec<(String, usize)>> {
            Ok(trajs
                .iter()
                .zip(id_selected)
                .flat_map(|(t, ids)| ids.iter().map(move |i| (t.clone(), *i)))
                .collect())
        }
    }

    fn selector(max: usize) -> ConfSelector<MemoryRender> {
        let report = ExplorationReport::TrustLevels(ReportTrustLevels::new(
            TrustLevel::new(0.1, 0.3),
            0.9,
            DownsamplePolicy::MaxDeviation,
        ));
        ConfSelector::new(Arc::new(MemoryRender), report, max)
    }

    #[test]
    fn test_select_respects_budget() {
        let trajs = vec!["t0".to_string(), "t1".to_string()];
        let devis = vec![vec![0.05, 0.2, 0.5, 0.25], vec![0.12, 0.29]];
        let (confs, report) = selector(2).select(&trajs, &devis, &[]).unwrap();
        assert_eq!(confs, vec![("t0".to_string(), 3), ("t1".to_string(), 1)]);
        assert!((report.candidate_ratio().unwrap() - 4.0 / 6.0).abs() < 1e-12);

        // the template stays untouched
        let sel = selector(2);
        sel.select(&trajs, &devis, &[]).unwrap();
        assert!(sel.report_template().classification().is_none());
    }

    #[test]
    fn test_select_applies_filters() {
        let trajs = vec!["t0".to_string()];
        let devis = vec![vec![0.2, 0.21, 0.22]];
        let sel = selector(10).with_filters(ConfFilters::new().add(|c: &(String, usize)| c.1 != 1));
        let (confs, _) = sel.select(&trajs, &devis, &[]).unwrap();
        assert_eq!(confs, vec![("t0".to_string(), 0), ("t0".to_string(), 2)]);
    }
}
