//! Detection tables and per-frame box extraction.

use std::collections::BTreeMap;

use nalgebra::DMatrix;

use crate::{Error, Result};

/// Which side of the evaluation a table belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Reference,
    Comparison,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Reference => write!(f, "reference"),
            Side::Comparison => write!(f, "comparison"),
        }
    }
}

/// One detection row.
///
/// Carries a box in (x, y, width, height) form and optionally
/// (lat, lon, alt) coordinates; which of the two the evaluation uses is
/// decided by [`crate::SimilarityMetric`].
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub frame: i64,
    pub object_id: i64,
    pub class_id: Option<i64>,
    pub bbox: [f64; 4],
    pub geo: Option<[f64; 3]>,
    pub score: Option<f64>,
}

impl Detection {
    /// Box-only detection.
    pub fn with_bbox(frame: i64, object_id: i64, bbox: [f64; 4]) -> Self {
        Self {
            frame,
            object_id,
            class_id: None,
            bbox,
            geo: None,
            score: None,
        }
    }

    /// Detection carrying geo-coordinates (lat, lon, alt).
    pub fn with_geo(frame: i64, object_id: i64, bbox: [f64; 4], geo: [f64; 3]) -> Self {
        Self {
            frame,
            object_id,
            class_id: None,
            bbox,
            geo: Some(geo),
            score: None,
        }
    }
}

/// All detections for one side of one video.
#[derive(Debug, Clone, Default)]
pub struct DetectionTable {
    rows: Vec<Detection>,
}

impl DetectionTable {
    pub fn new(rows: Vec<Detection>) -> Self {
        Self { rows }
    }

    /// Empty table, used when a video has no comparison data at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[Detection] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only rows of the given class; `None` keeps everything.
    pub fn filter_class(&self, class_id: Option<i64>) -> DetectionTable {
        match class_id {
            None => self.clone(),
            Some(c) => DetectionTable::new(
                self.rows
                    .iter()
                    .filter(|d| d.class_id == Some(c))
                    .cloned()
                    .collect(),
            ),
        }
    }

    fn group_by_frame(&self) -> BTreeMap<i64, Vec<&Detection>> {
        let mut groups: BTreeMap<i64, Vec<&Detection>> = BTreeMap::new();
        for det in &self.rows {
            groups.entry(det.frame).or_default().push(det);
        }
        groups
    }
}

/// ID and coordinate arrays for one side of one (video, frame).
///
/// Invariant: `ids` are unique; construction fails otherwise.
#[derive(Debug, Clone)]
pub struct FrameBoxes {
    /// Raw object IDs, in row order of `boxes` and `geo`.
    pub ids: Vec<i64>,
    /// Boxes in (x, y, w, h) rows, shape (n, 4).
    pub boxes: DMatrix<f64>,
    /// Geo-coordinates in (lat, lon, alt) rows, shape (n, 3); NaN where a
    /// detection carried none.
    pub geo: DMatrix<f64>,
}

impl FrameBoxes {
    /// Zero-detection set, still correctly shaped for cost computation.
    pub fn empty() -> Self {
        Self {
            ids: Vec::new(),
            boxes: DMatrix::zeros(0, 4),
            geo: DMatrix::zeros(0, 3),
        }
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn from_rows(rows: &[&Detection], side: Side, video_id: &str, frame: i64) -> Result<FrameBoxes> {
        let n = rows.len();
        let mut ids = Vec::with_capacity(n);
        let mut boxes = DMatrix::zeros(n, 4);
        let mut geo = DMatrix::from_element(n, 3, f64::NAN);

        for (i, det) in rows.iter().enumerate() {
            ids.push(det.object_id);
            for k in 0..4 {
                boxes[(i, k)] = det.bbox[k];
            }
            if let Some(g) = det.geo {
                for k in 0..3 {
                    geo[(i, k)] = g[k];
                }
            }
        }

        // IDs must be unique within a side per frame; this is a hard
        // data-integrity guarantee for both ground truth and submissions.
        let mut seen = std::collections::HashSet::with_capacity(n);
        let mut duplicates: Vec<i64> = Vec::new();
        for &id in &ids {
            if !seen.insert(id) && !duplicates.contains(&id) {
                duplicates.push(id);
            }
        }
        if !duplicates.is_empty() {
            duplicates.sort_unstable();
            return Err(Error::DuplicateIds {
                side: side.to_string(),
                video_id: video_id.to_string(),
                frame,
                ids: duplicates,
            });
        }

        Ok(FrameBoxes { ids, boxes, geo })
    }
}

/// Reference and comparison box sets for one (video, frame).
#[derive(Debug, Clone)]
pub struct FramePair {
    pub video_id: String,
    pub frame: i64,
    pub reference: FrameBoxes,
    pub comparison: FrameBoxes,
}

/// Split two tables into per-frame box sets over the union of their frames.
///
/// A frame present on one side only yields an empty set on the other, so
/// pure false-positive / false-negative frames still reach the accounting
/// stages. Frames come back sorted.
pub fn extract_frame_pairs(
    video_id: &str,
    reference: &DetectionTable,
    comparison: &DetectionTable,
) -> Result<Vec<FramePair>> {
    let ref_groups = reference.group_by_frame();
    let comp_groups = comparison.group_by_frame();

    let mut frames: Vec<i64> = ref_groups.keys().chain(comp_groups.keys()).copied().collect();
    frames.sort_unstable();
    frames.dedup();

    let mut pairs = Vec::with_capacity(frames.len());
    for frame in frames {
        let reference = match ref_groups.get(&frame) {
            Some(rows) => FrameBoxes::from_rows(rows, Side::Reference, video_id, frame)?,
            None => FrameBoxes::empty(),
        };
        let comparison = match comp_groups.get(&frame) {
            Some(rows) => FrameBoxes::from_rows(rows, Side::Comparison, video_id, frame)?,
            None => FrameBoxes::empty(),
        };
        pairs.push(FramePair {
            video_id: video_id.to_string(),
            frame,
            reference,
            comparison,
        });
    }
    Ok(pairs)
}
