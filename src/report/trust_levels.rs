//! Exploration report with fixed trust levels.
//!
//! K_i: force deviation < lo → accurate, ≥ hi → failed, otherwise candidate
//! K_i: Virial is only consulted when a virial trust level is configured
//! K_i: accurate = accurate_f ∩ accurate_v, failed = failed_f ∪ failed_v

use super::classification::{FrameClass, FrameClassification};
use super::downsample::DownsamplePolicy;
use super::force_and_virial;
use crate::models::{DeviationStore, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Trust level thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustLevel {
    pub level_f_lo: f64,
    pub level_f_hi: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_v: Option<(f64, f64)>,
}

impl TrustLevel {
    /// Force-only trust level.
    pub fn new(level_f_lo: f64, level_f_hi: f64) -> Self {
        Self {
            level_f_lo,
            level_f_hi,
            level_v: None,
        }
    }

    /// Add a virial trust level.
    ///
    /// An unbounded window (−∞, +∞) never vetoes a frame and is stored as
    /// "no virial level".
    pub fn with_virial(mut self, level_v_lo: f64, level_v_hi: f64) -> Self {
        let unbounded = level_v_lo == f64::NEG_INFINITY && level_v_hi == f64::INFINITY;
        self.level_v = (!unbounded).then_some((level_v_lo, level_v_hi));
        self
    }

    pub fn has_virial(&self) -> bool {
        self.level_v.is_some()
    }

    /// Classify one frame.
    pub fn classify(&self, devi_f: f64, devi_v: f64) -> FrameClass {
        let class_f = classify_one(devi_f, self.level_f_lo, self.level_f_hi);
        let class_v = match self.level_v {
            Some((lo, hi)) => classify_one(devi_v, lo, hi),
            None => FrameClass::Accurate,
        };
        match (class_f, class_v) {
            (FrameClass::Failed, _) | (_, FrameClass::Failed) => FrameClass::Failed,
            (FrameClass::Accurate, FrameClass::Accurate) => FrameClass::Accurate,
            _ => FrameClass::Candidate,
        }
    }
}

fn classify_one(devi: f64, lo: f64, hi: f64) -> FrameClass {
    if devi >= hi {
        FrameClass::Failed
    } else if devi < lo {
        FrameClass::Accurate
    } else {
        FrameClass::Candidate
    }
}

/// Report classifying frames against fixed trust levels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportTrustLevels {
    trust: TrustLevel,
    conv_accuracy: f64,
    downsample: DownsamplePolicy,
    #[serde(default)]
    classification: Option<FrameClassification>,
}

impl ReportTrustLevels {
    pub fn new(trust: TrustLevel, conv_accuracy: f64, downsample: DownsamplePolicy) -> Self {
        Self {
            trust,
            conv_accuracy,
            downsample,
            classification: None,
        }
    }

    pub fn trust_level(&self) -> &TrustLevel {
        &self.trust
    }

    pub fn conv_accuracy(&self) -> f64 {
        self.conv_accuracy
    }

    pub fn downsample(&self) -> &DownsamplePolicy {
        &self.downsample
    }

    pub fn classification(&self) -> Option<&FrameClassification> {
        self.classification.as_ref()
    }

    /// Classify every frame of `store`, replacing any previous result.
    pub fn record(&mut self, store: &DeviationStore) -> Result<()> {
        let (md_f, md_v) = force_and_virial(store)?;

        let labels: Vec<Vec<FrameClass>> = md_f
            .iter()
            .zip(&md_v)
            .map(|(f, v)| {
                f.iter()
                    .enumerate()
                    .map(|(frame, devi_f)| {
                        let devi_v = v.map_or(0.0, |v| v[frame]);
                        self.trust.classify(*devi_f, devi_v)
                    })
                    .collect()
            })
            .collect();

        let classification = FrameClassification::new(labels, &md_f);
        debug!(
            ntraj = md_f.len(),
            accurate = classification.num_accurate(),
            candidate = classification.num_candidate(),
            failed = classification.num_failed(),
            "Recorded model deviation against fixed trust levels"
        );
        self.classification = Some(classification);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.classification = None;
    }
}
