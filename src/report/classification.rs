//! Partition of sampled frames into accurate / candidate / failed.

use super::downsample::{Candidate, DownsamplePolicy};
use serde::{Deserialize, Serialize};

/// Class of a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameClass {
    Accurate,
    Candidate,
    Failed,
}

/// (trajectory index, frame index)
pub type FrameId = (usize, usize);

/// Classification of every frame of every trajectory.
///
/// K_i: Each frame carries exactly one label, so the three sets are
///      disjoint and cover all frames by construction.
///
/// Only the counts are serialized. A restored classification still answers
/// ratio queries but no longer lists frames.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameClassification {
    accurate: usize,
    candidate: usize,
    failed: usize,
    #[serde(skip)]
    labels: Vec<Vec<FrameClass>>,
    #[serde(skip)]
    candidates: Vec<Candidate>,
}

impl FrameClassification {
    /// Build from per-trajectory labels and the force deviations used to
    /// rank candidates.
    pub fn new(labels: Vec<Vec<FrameClass>>, max_devi_f: &[&[f64]]) -> Self {
        let mut out = Self::default();
        for (traj, frames) in labels.iter().enumerate() {
            for (frame, class) in frames.iter().enumerate() {
                match class {
                    FrameClass::Accurate => out.accurate += 1,
                    FrameClass::Failed => out.failed += 1,
                    FrameClass::Candidate => {
                        out.candidate += 1;
                        out.candidates.push(Candidate {
                            traj,
                            frame,
                            max_devi_f: max_devi_f[traj][frame],
                        });
                    }
                }
            }
        }
        out.labels = labels;
        out
    }

    /// Total number of frames.
    pub fn total(&self) -> usize {
        self.accurate + self.candidate + self.failed
    }

    pub fn num_accurate(&self) -> usize {
        self.accurate
    }

    pub fn num_candidate(&self) -> usize {
        self.candidate
    }

    pub fn num_failed(&self) -> usize {
        self.failed
    }

    /// Fraction of accurate frames (0.0 when there are no frames).
    pub fn accurate_ratio(&self) -> f64 {
        self.ratio(self.accurate)
    }

    pub fn candidate_ratio(&self) -> f64 {
        self.ratio(self.candidate)
    }

    pub fn failed_ratio(&self) -> f64 {
        self.ratio(self.failed)
    }

    fn ratio(&self, count: usize) -> f64 {
        match self.total() {
            0 => 0.0,
            total => count as f64 / total as f64,
        }
    }

    /// Label of one frame, if it was classified in this session.
    pub fn class_of(&self, (traj, frame): FrameId) -> Option<FrameClass> {
        self.labels.get(traj)?.get(frame).copied()
    }

    /// All frames carrying `class`, ordered by (trajectory, frame).
    pub fn frames(&self, class: FrameClass) -> Vec<FrameId> {
        self.labels
            .iter()
            .enumerate()
            .flat_map(|(traj, frames)| {
                frames
                    .iter()
                    .enumerate()
                    .filter(move |(_, c)| **c == class)
                    .map(move |(frame, _)| (traj, frame))
            })
            .collect()
    }

    /// Candidate frame indices per trajectory, downsampled to `max_nframes`.
    pub fn candidate_ids(&self, max_nframes: usize, policy: &DownsamplePolicy) -> Vec<Vec<usize>> {
        let mut ids = vec![Vec::new(); self.labels.len()];
        for c in policy.pick(&self.candidates, max_nframes) {
            ids[c.traj].push(c.frame);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use FrameClass::*;

    #[test]
    fn test_counts_and_frames() {
        let devi: Vec<&[f64]> = vec![&[0.05, 0.2, 0.5], &[0.25]];
        let cls = FrameClassification::new(vec![vec![Accurate, Candidate, Failed], vec![Candidate]], &devi);
        assert_eq!(cls.total(), 4);
        assert_eq!(cls.frames(Candidate), vec![(0, 1), (1, 0)]);
        assert_eq!(cls.frames(Failed), vec![(0, 2)]);
        assert_eq!(cls.class_of((0, 0)), Some(Accurate));
        assert_eq!(cls.class_of((3, 0)), None);
        assert!((cls.candidate_ratio() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_ratios_are_zero() {
        let cls = FrameClassification::new(Vec::new(), &[]);
        assert_eq!(cls.total(), 0);
        assert_eq!(cls.accurate_ratio(), 0.0);
        assert_eq!(cls.failed_ratio(), 0.0);
    }

    #[test]
    fn test_serialized_counts_survive() {
        let devi: Vec<&[f64]> = vec![&[0.2, 0.01]];
        let cls = FrameClassification::new(vec![vec![Candidate, Accurate]], &devi);
        let json = serde_json::to_string(&cls).unwrap();
        let restored: FrameClassification = serde_json::from_str(&json).unwrap();
        assert!((restored.accurate_ratio() - 0.5).abs() < 1e-12);
        assert!(restored.frames(Candidate).is_empty());
    }
}
