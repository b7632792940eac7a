//! Candidate downsampling under a labeling budget.
//!
//! K_i: The policy is chosen at construction, not per call
//! K_i: Max-deviation picking is deterministic; random picking is
//!      deterministic only when seeded

use rand::SeedableRng;
use rand::seq::index;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A candidate frame together with its force deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub traj: usize,
    pub frame: usize,
    pub max_devi_f: f64,
}

/// Strategy for reducing the candidate set to the labeling budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum DownsamplePolicy {
    /// Uniformly random subset
    Random {
        #[serde(default)]
        seed: Option<u64>,
    },
    /// The frames with the largest `max_devi_f` (default)
    #[default]
    MaxDeviation,
}

impl DownsamplePolicy {
    /// Pick at most `max_nframes` candidates.
    ///
    /// The result is ordered by (trajectory, frame). A seeded random pick
    /// draws from the ChaCha stream keyed by the candidate set, so the same
    /// candidates give the same pick and different iterations draw
    /// independently.
    pub fn pick(&self, candidates: &[Candidate], max_nframes: usize) -> Vec<Candidate> {
        let mut picked: Vec<Candidate> = if candidates.len() <= max_nframes {
            candidates.to_vec()
        } else {
            match self {
                Self::Random { seed: Some(seed) } => {
                    let mut rng = ChaCha8Rng::seed_from_u64(*seed);
                    rng.set_stream(stream_of(candidates));
                    index::sample(&mut rng, candidates.len(), max_nframes)
                        .into_iter()
                        .map(|i| candidates[i])
                        .collect()
                }
                Self::Random { seed: None } => {
                    let mut rng = rand::rng();
                    index::sample(&mut rng, candidates.len(), max_nframes)
                        .into_iter()
                        .map(|i| candidates[i])
                        .collect()
                }
                Self::MaxDeviation => {
                    let mut sorted = candidates.to_vec();
                    sorted.sort_by(|a, b| {
                        b.max_devi_f
                            .total_cmp(&a.max_devi_f)
                            .then_with(|| frame_order(a, b))
                    });
                    sorted.truncate(max_nframes);
                    sorted
                }
            }
        };
        picked.sort_by(frame_order);
        picked
    }
}

fn frame_order(a: &Candidate, b: &Candidate) -> Ordering {
    (a.traj, a.frame).cmp(&(b.traj, b.frame))
}

/// Stream id of a candidate set.
fn stream_of(candidates: &[Candidate]) -> u64 {
    candidates.iter().fold(candidates.len() as u64, |acc, c| {
        let acc = splitmix(acc ^ c.traj as u64);
        let acc = splitmix(acc ^ c.frame as u64);
        splitmix(acc ^ c.max_devi_f.to_bits())
    })
}

fn splitmix(z: u64) -> u64 {
    let z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    let z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
