//! Trajectory rendering - the boundary to MD output.
//!
//! K_i: Trajectories are opaque handles here; they are never decoded
//! B_i: Model deviation tables may be malformed → Result
//! I^R: Other engines plug in by implementing `TrajRender`

use crate::models::{DeviationChannel, DeviationStore, ExploreError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Reads model deviations of finished MD tasks and materializes selected
/// frames as configurations.
pub trait TrajRender {
    /// Trajectory handle
    type Traj;
    /// Source of one trajectory's model deviation
    type DeviSource;
    /// Materialized configuration
    type Conf;

    /// Load the deviations of all trajectories, in order.
    fn get_model_devi(&self, sources: &[Self::DeviSource]) -> Result<DeviationStore>;

    /// Materialize the selected frames (`id_selected[i]` for trajectory i).
    fn get_confs(
        &self,
        trajs: &[Self::Traj],
        id_selected: &[Vec<usize>],
        type_map: &[String],
    ) -> Result<Vec<Self::Conf>>;
}

/// Reference to one frame of a trajectory file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRef {
    pub trajectory: PathBuf,
    pub traj_idx: usize,
    pub frame: usize,
}

/// Columns of a DeePMD `model_devi.out` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelDeviTable {
    pub steps: Vec<u64>,
    pub max_devi_v: Vec<f64>,
    pub min_devi_v: Vec<f64>,
    pub avg_devi_v: Vec<f64>,
    pub max_devi_f: Vec<f64>,
    pub min_devi_f: Vec<f64>,
    pub avg_devi_f: Vec<f64>,
}

impl ModelDeviTable {
    /// Parse a whitespace separated table.
    ///
    /// Expected columns: `step max_devi_v min_devi_v avg_devi_v max_devi_f
    /// min_devi_f avg_devi_f`. Lines starting with `#` are comments; extra
    /// trailing columns are ignored.
    pub fn parse(content: &str) -> Result<Self> {
        let mut table = Self::default();
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 7 {
                return Err(ExploreError::Parse(format!(
                    "Line {}: expected 7 columns, found {}",
                    line_num + 1,
                    cols.len()
                )));
            }
            let step = cols[0].parse::<f64>().map_err(|e| {
                ExploreError::Parse(format!("Line {}: step: {}", line_num + 1, e))
            })?;
            let mut values = [0.0f64; 6];
            for (value, col) in values.iter_mut().zip(&cols[1..7]) {
                *value = col.parse().map_err(|e| {
                    ExploreError::Parse(format!("Line {}: '{}': {}", line_num + 1, col, e))
                })?;
            }
            table.steps.push(step as u64);
            table.max_devi_v.push(values[0]);
            table.min_devi_v.push(values[1]);
            table.avg_devi_v.push(values[2]);
            table.max_devi_f.push(values[3]);
            table.min_devi_f.push(values[4]);
            table.avg_devi_f.push(values[5]);
        }
        Ok(table)
    }

    /// Append all six channels as the next trajectory of `store`.
    pub fn add_to(self, store: &mut DeviationStore, with_virial: bool) {
        store.add(DeviationChannel::MaxDeviF, self.max_devi_f);
        store.add(DeviationChannel::MinDeviF, self.min_devi_f);
        store.add(DeviationChannel::AvgDeviF, self.avg_devi_f);
        if with_virial {
            store.add(DeviationChannel::MaxDeviV, self.max_devi_v);
            store.add(DeviationChannel::MinDeviV, self.min_devi_v);
            store.add(DeviationChannel::AvgDeviV, self.avg_devi_v);
        }
    }
}

/// Render for LAMMPS/DeePMD runs: deviations come from `model_devi.out`
/// files, selections are returned as frame references.
#[derive(Debug, Clone, Default)]
pub struct ModelDeviTableRender {
    with_virial: bool,
}

impl ModelDeviTableRender {
    pub fn new(with_virial: bool) -> Self {
        Self { with_virial }
    }
}

impl TrajRender for ModelDeviTableRender {
    type Traj = PathBuf;
    type DeviSource = PathBuf;
    type Conf = FrameRef;

    fn get_model_devi(&self, sources: &[PathBuf]) -> Result<DeviationStore> {
        let mut store = DeviationStore::new();
        for path in sources {
            let content = fs::read_to_string(path).map_err(|e| {
                ExploreError::io(format!("reading model deviation {}", path.display()), e)
            })?;
            let table = ModelDeviTable::parse(&content)
                .map_err(|e| ExploreError::Parse(format!("{}: {}", path.display(), e)))?;
            debug!(path = %path.display(), frames = table.steps.len(), "Loaded model deviation");
            table.add_to(&mut store, self.with_virial);
        }
        Ok(store)
    }

    fn get_confs(
        &self,
        trajs: &[PathBuf],
        id_selected: &[Vec<usize>],
        _type_map: &[String],
    ) -> Result<Vec<FrameRef>> {
        if trajs.len() != id_selected.len() {
            return Err(ExploreError::Inconsistent(format!(
                "{} trajectories but selections for {}",
                trajs.len(),
                id_selected.len()
            )));
        }
        Ok(trajs
            .iter()
            .zip(id_selected)
            .enumerate()
            .flat_map(|(traj_idx, (path, frames))| {
                frames.iter().map(move |frame| FrameRef {
                    trajectory: path.clone(),
                    traj_idx,
                    frame: *frame,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TABLE: &str = "\
#       step         max_devi_v         min_devi_v         avg_devi_v         max_devi_f         min_devi_f         avg_devi_f
           0       1.438563e-03       1.689e-04       7.9e-04       2.3e-02       4.2e-03       1.2e-02
          10       2.1e-03       1.7e-04       8.1e-04       1.5e-01       5.3e-03       6.1e-02
          20       3.4e-03       2.0e-04       9.0e-04       4.1e-01       6.2e-03       1.9e-01
";

    #[test]
    fn test_parse_table() {
        let table = ModelDeviTable::parse(TABLE).unwrap();
        assert_eq!(table.steps, vec![0, 10, 20]);
        assert_eq!(table.max_devi_f, vec![2.3e-02, 1.5e-01, 4.1e-01]);
        assert!((table.max_devi_v[0] - 1.438563e-03).abs() < 1e-12);
    }

    #[test]
    fn test_parse_rejects_short_rows() {
        let err = ModelDeviTable::parse("0 0.1 0.2\n").unwrap_err();
        assert!(err.to_string().contains("Line 1"));
    }

    #[test]
    fn test_render_reads_files() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.out");
        let b = dir.path().join("b.out");
        fs::write(&a, TABLE).unwrap();
        fs::write(&b, "0 0 0 0 0.2 0 0\n").unwrap();

        let render = ModelDeviTableRender::new(false);
        let store = render.get_model_devi(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(store.ntraj(), 2);
        let v = store.get(DeviationChannel::MaxDeviV).unwrap();
        assert_eq!(v, vec![None, None]);

        let confs = render
            .get_confs(&[a.clone(), b], &[vec![1, 2], vec![]], &[])
            .unwrap();
        assert_eq!(confs.len(), 2);
        assert_eq!(confs[0], FrameRef { trajectory: a, traj_idx: 0, frame: 1 });
    }

    #[test]
    fn test_get_confs_length_mismatch() {
        let render = ModelDeviTableRender::new(true);
        let err = render.get_confs(&[PathBuf::from("x")], &[], &[]).unwrap_err();
        assert!(matches!(err, ExploreError::Inconsistent(_)));
    }
}
