//! Multi-object tracking evaluation with the HOTA metric family.
//!
//! Compares "comparison" detection tables (tracker output) against
//! "reference" tables (ground truth) across one or more videos and
//! produces per-video and combined HOTA, DetA, AssA, LocA and OWTA
//! scores over a fixed sweep of 19 similarity thresholds.
//!
//! The pipeline runs in four stages per video:
//!
//! 1. per-frame similarity matrices between the two sides
//!    ([`similarity`]),
//! 2. one video-level identity alignment folding every frame into a
//!    Jaccard-style co-occurrence matrix and solving a single
//!    assignment ([`alignment`]),
//! 3. per-frame match accounting over the threshold sweep, producing
//!    summable precursors ([`precursor`]),
//! 4. finalization into metric records and cross-video merging
//!    ([`metrics`]).
//!
//! Frame-level stages parallelize over a bounded worker pool; results
//! are independent of worker count.
//!
//! ```
//! use std::collections::HashMap;
//! use reid_hota::{Detection, DetectionTable, HotaConfig, HotaEvaluator};
//!
//! let rows = vec![
//!     Detection::with_bbox(0, 1, [0.0, 0.0, 10.0, 10.0]),
//!     Detection::with_bbox(1, 1, [2.0, 0.0, 10.0, 10.0]),
//! ];
//! let tables = HashMap::from([("cam0".to_string(), DetectionTable::new(rows))]);
//!
//! let evaluator = HotaEvaluator::new(HotaConfig::default())?;
//! let results = evaluator.evaluate(&tables, &tables)?;
//! assert!((results.global_record().scalars().hota - 1.0).abs() < 1e-9);
//! # Ok::<(), reid_hota::Error>(())
//! ```

pub mod alignment;
pub mod assignment;
pub mod config;
pub mod cost_matrix;
pub mod detection;
pub mod evaluator;
pub mod executor;
pub mod metrics;
pub mod precursor;
pub mod similarity;
pub mod sparse;

mod error {
    /// Crate-wide error type.
    #[derive(Debug, thiserror::Error)]
    pub enum Error {
        /// A side repeated an object ID within a single frame.
        #[error("Duplicate {side} IDs {ids:?} in video {video_id:?} frame {frame}")]
        DuplicateIds {
            side: String,
            video_id: String,
            frame: i64,
            ids: Vec<i64>,
        },

        /// A matched ID pair had no finite similarity in its frame matrix.
        #[error(
            "No similarity for pair ({ref_id}, {comp_id}) in video {video_id:?} frame {frame}"
        )]
        MissingSimilarity {
            video_id: String,
            frame: i64,
            ref_id: i64,
            comp_id: i64,
        },

        /// Merge called with no records.
        #[error("Cannot merge an empty set of metric records")]
        EmptyMerge,

        /// Configuration failed validation.
        #[error("Invalid configuration: {0}")]
        InvalidConfig(String),

        /// A persisted file carries an unsupported schema version.
        #[error("Unsupported schema version {got} (expected {expected})")]
        SchemaVersion { expected: u32, got: u32 },

        #[error("IO error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Serialization error: {0}")]
        Serde(#[from] serde_json::Error),
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

pub use crate::alignment::GlobalCostMatrix;
pub use crate::config::{
    HotaConfig, IdAlignmentMethod, SimilarityMetric, ALPHA_THRESHOLDS, NUM_ALPHAS,
};
pub use crate::cost_matrix::{CostMatrixData, SCHEMA_VERSION};
pub use crate::detection::{Detection, DetectionTable, FrameBoxes, FramePair, Side};
pub use crate::error::{Error, Result};
pub use crate::evaluator::{HotaEvaluator, HotaResults};
pub use crate::metrics::{HotaRecord, ScalarMetrics, COMBINED_VIDEO_ID};
pub use crate::precursor::HotaPrecursor;
