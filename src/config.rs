//! Evaluation configuration and the fixed similarity-threshold sweep.

use crate::{Error, Result};

/// Similarity thresholds the HOTA family integrates over: 0.05..=0.95 step 0.05.
///
/// Fixed process-wide; every per-threshold array in the crate has this length.
pub const ALPHA_THRESHOLDS: [f64; 19] = [
    0.05, 0.10, 0.15, 0.20, 0.25, 0.30, 0.35, 0.40, 0.45, 0.50, 0.55, 0.60, 0.65, 0.70, 0.75,
    0.80, 0.85, 0.90, 0.95,
];

/// Number of entries in [`ALPHA_THRESHOLDS`].
pub const NUM_ALPHAS: usize = ALPHA_THRESHOLDS.len();

/// How reference identities are aligned to comparison identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdAlignmentMethod {
    /// Solve one assignment over the whole video and reuse it for every frame.
    #[default]
    Global,
    /// Re-solve the assignment within each frame, weighting local similarity
    /// by the video-level identity score.
    PerFrame,
}

/// Which per-frame similarity is computed between detections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityMetric {
    /// Intersection-over-union of axis-aligned boxes.
    #[default]
    Iou,
    /// Haversine distance between (lat, lon) coordinates mapped to [0, 1].
    Geo,
}

/// Configuration consumed by [`crate::HotaEvaluator`].
#[derive(Debug, Clone)]
pub struct HotaConfig {
    /// Identity alignment strategy.
    pub id_alignment_method: IdAlignmentMethod,
    /// Per-frame similarity metric.
    pub similarity_metric: SimilarityMetric,
    /// Worker count for frame-level stages; `<= 1` forces sequential execution.
    pub n_workers: usize,
    /// Optional class filter applied to both detection tables before
    /// frame extraction.
    pub class_id: Option<i64>,
    /// Distance in meters at which geo similarity reaches zero.
    pub geo_max_distance_m: f64,
}

impl Default for HotaConfig {
    fn default() -> Self {
        Self {
            id_alignment_method: IdAlignmentMethod::Global,
            similarity_metric: SimilarityMetric::Iou,
            n_workers: 0,
            class_id: None,
            geo_max_distance_m: 50.0,
        }
    }
}

impl HotaConfig {
    /// Validate configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if self.geo_max_distance_m <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "geo_max_distance_m must be positive, got {}",
                self.geo_max_distance_m
            )));
        }
        Ok(())
    }
}
