//! Model deviation storage.
//!
//! K_i: Six named deviation channels, validated at the boundary
//! K_i: One 1-D array per trajectory per channel
//! B_i: Callers may populate channels inconsistently → checked on `get`

use super::{ExploreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A model deviation channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviationChannel {
    MaxDeviF,
    MinDeviF,
    AvgDeviF,
    MaxDeviV,
    MinDeviV,
    AvgDeviV,
}

impl DeviationChannel {
    /// All channels, in canonical order.
    pub const ALL: [DeviationChannel; 6] = [
        Self::MaxDeviF,
        Self::MinDeviF,
        Self::AvgDeviF,
        Self::MaxDeviV,
        Self::MinDeviV,
        Self::AvgDeviV,
    ];

    /// Canonical channel name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MaxDeviF => "max_devi_f",
            Self::MinDeviF => "min_devi_f",
            Self::AvgDeviF => "avg_devi_f",
            Self::MaxDeviV => "max_devi_v",
            Self::MinDeviV => "min_devi_v",
            Self::AvgDeviV => "avg_devi_v",
        }
    }
}

impl fmt::Display for DeviationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviationChannel {
    type Err = ExploreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ExploreError::InvalidChannel(s.to_string()))
    }
}

/// Per-trajectory storage of model deviation channels.
///
/// Arrays are appended per channel in trajectory order; the i-th array
/// added to a channel belongs to trajectory i.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviationStore {
    ntraj: usize,
    data: BTreeMap<DeviationChannel, Vec<Vec<f64>>>,
}

impl DeviationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trajectories recorded so far.
    pub fn ntraj(&self) -> usize {
        self.ntraj
    }

    /// Append the deviation array of the next trajectory to `channel`.
    pub fn add(&mut self, channel: DeviationChannel, values: Vec<f64>) {
        let entries = self.data.entry(channel).or_default();
        entries.push(values);
        self.ntraj = self.ntraj.max(entries.len());
    }

    /// Append an array given by channel name and shape.
    ///
    /// Rejects unknown channel names and arrays that are not 1-D.
    pub fn add_shaped(&mut self, name: &str, shape: &[usize], values: Vec<f64>) -> Result<()> {
        let channel: DeviationChannel = name.parse()?;
        if shape.len() != 1 {
            return Err(ExploreError::InvalidShape {
                channel: name.to_string(),
                ndim: shape.len(),
            });
        }
        if shape[0] != values.len() {
            return Err(ExploreError::Inconsistent(format!(
                "{name}: declared length {} but {} values given",
                shape[0],
                values.len()
            )));
        }
        self.add(channel, values);
        Ok(())
    }

    /// Get the per-trajectory arrays of a channel.
    ///
    /// Returns `ntraj` entries; all `None` if the channel was never populated.
    pub fn get(&self, channel: DeviationChannel) -> Result<Vec<Option<&[f64]>>> {
        self.check_data()?;
        Ok(match self.data.get(&channel) {
            Some(entries) if !entries.is_empty() => {
                entries.iter().map(|v| Some(v.as_slice())).collect()
            }
            _ => vec![None; self.ntraj],
        })
    }

    /// Reset to the empty, zero-trajectory state.
    pub fn clear(&mut self) {
        self.ntraj = 0;
        self.data.clear();
    }

    /// Check that all populated channels agree with each other.
    pub fn check_data(&self) -> Result<()> {
        let populated: Vec<(DeviationChannel, &Vec<Vec<f64>>)> = self
            .data
            .iter()
            .filter(|(_, v)| !v.is_empty())
            .map(|(c, v)| (*c, v))
            .collect();

        for (channel, entries) in &populated {
            if entries.len() != self.ntraj {
                return Err(ExploreError::Inconsistent(format!(
                    "the number of {channel} arrays ({}) differs from the number of trajectories ({})",
                    entries.len(),
                    self.ntraj
                )));
            }
        }

        if self.ntraj == 0 {
            return Ok(());
        }

        let max_devi_f = match self.data.get(&DeviationChannel::MaxDeviF) {
            Some(v) if !v.is_empty() => v,
            _ => return Err(ExploreError::MissingMaxDeviF { traj: 0 }),
        };

        for traj in 0..self.ntraj {
            let nframes = max_devi_f[traj].len();
            for (channel, entries) in &populated {
                if entries[traj].len() != nframes {
                    return Err(ExploreError::Inconsistent(format!(
                        "trajectory {traj}: {channel} has {} frames but max_devi_f has {nframes}",
                        entries[traj].len()
                    )));
                }
            }
        }

        Ok(())
    }
}
