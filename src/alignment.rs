//! Video-level identity alignment.
//!
//! Folds every frame's similarity matrix into one identity-similarity
//! matrix over the union of IDs seen in the video, then solves a single
//! one-to-one assignment reused by the accumulation stage.

use std::collections::HashMap;

use nalgebra::DMatrix;

use crate::assignment::max_weight_assignment;
use crate::cost_matrix::CostMatrixData;
use crate::similarity::EPSILON;

/// Identity-similarity matrix for one video plus the solved ref -> comp map.
///
/// Cell (i, j) is a Jaccard-style co-occurrence score: the sum of
/// per-frame normalized similarities of the pair, divided by
/// `count(i) + count(j) - sum`. Pairs that co-occur exclusively score
/// near 1; pairs whose overlap is shared among competing IDs, or that
/// rarely co-occur, are pushed toward 0.
#[derive(Debug, Clone)]
pub struct GlobalCostMatrix {
    video_id: String,
    ref_ids: Vec<i64>,
    comp_ids: Vec<i64>,
    matrix: DMatrix<f64>,
    ref_index: HashMap<i64, usize>,
    comp_index: HashMap<i64, usize>,
    ref2comp: HashMap<i64, i64>,
}

impl GlobalCostMatrix {
    /// Aggregate a video's per-frame cost matrices and solve the identity
    /// assignment.
    pub fn build(video_id: impl Into<String>, frames: &[CostMatrixData]) -> GlobalCostMatrix {
        let mut ref_ids: Vec<i64> = frames.iter().flat_map(|f| f.ref_ids().iter().copied()).collect();
        ref_ids.sort_unstable();
        ref_ids.dedup();
        let mut comp_ids: Vec<i64> = frames.iter().flat_map(|f| f.comp_ids().iter().copied()).collect();
        comp_ids.sort_unstable();
        comp_ids.dedup();

        let ref_index: HashMap<i64, usize> =
            ref_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let comp_index: HashMap<i64, usize> =
            comp_ids.iter().enumerate().map(|(j, &id)| (id, j)).collect();

        let mut ref_counts = vec![0.0f64; ref_ids.len()];
        let mut comp_counts = vec![0.0f64; comp_ids.len()];
        let mut sum: DMatrix<f64> = DMatrix::zeros(ref_ids.len(), comp_ids.len());

        for frame in frames {
            let rows: Vec<usize> = frame.ref_ids().iter().map(|id| ref_index[id]).collect();
            let cols: Vec<usize> = frame.comp_ids().iter().map(|id| comp_index[id]).collect();
            for &r in &rows {
                ref_counts[r] += 1.0;
            }
            for &c in &cols {
                comp_counts[c] += 1.0;
            }

            let normalized = normalize_frame(frame.matrix());
            for (li, &gi) in rows.iter().enumerate() {
                for (lj, &gj) in cols.iter().enumerate() {
                    sum[(gi, gj)] += normalized[(li, lj)];
                }
            }
        }

        let mut matrix = sum;
        for i in 0..matrix.nrows() {
            for j in 0..matrix.ncols() {
                let s = matrix[(i, j)];
                matrix[(i, j)] = s / (ref_counts[i] + comp_counts[j] - s).max(EPSILON);
            }
        }

        let ref2comp = max_weight_assignment(&matrix)
            .into_iter()
            .map(|(i, j)| (ref_ids[i], comp_ids[j]))
            .collect();

        GlobalCostMatrix {
            video_id: video_id.into(),
            ref_ids,
            comp_ids,
            matrix,
            ref_index,
            comp_index,
            ref2comp,
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn ref_ids(&self) -> &[i64] {
        &self.ref_ids
    }

    pub fn comp_ids(&self) -> &[i64] {
        &self.comp_ids
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// The solved partial one-to-one identity map.
    pub fn ref2comp(&self) -> &HashMap<i64, i64> {
        &self.ref2comp
    }

    pub fn ref_idx(&self, ref_id: i64) -> Option<usize> {
        self.ref_index.get(&ref_id).copied()
    }

    pub fn comp_idx(&self, comp_id: i64) -> Option<usize> {
        self.comp_index.get(&comp_id).copied()
    }

    /// Co-occurrence similarity of an ID pair; NaN when either ID never
    /// appeared in the video.
    pub fn score(&self, ref_id: i64, comp_id: i64) -> f64 {
        match (self.ref_idx(ref_id), self.comp_idx(comp_id)) {
            (Some(i), Some(j)) => self.matrix[(i, j)],
            _ => f64::NAN,
        }
    }
}

/// Normalize one frame's similarity matrix cellwise by
/// `row_sum + col_sum - cell`, floored at epsilon.
fn normalize_frame(matrix: &DMatrix<f64>) -> DMatrix<f64> {
    let n = matrix.nrows();
    let m = matrix.ncols();
    let row_sums: Vec<f64> = (0..n).map(|i| matrix.row(i).sum()).collect();
    let col_sums: Vec<f64> = (0..m).map(|j| matrix.column(j).sum()).collect();

    let mut out = DMatrix::zeros(n, m);
    for i in 0..n {
        for j in 0..m {
            let v = matrix[(i, j)];
            out[(i, j)] = v / (row_sums[i] + col_sums[j] - v).max(EPSILON);
        }
    }
    out
}
