//! Per-frame match accounting over the threshold sweep.
//!
//! Each frame produces one [`HotaPrecursor`]; precursors combine by pure
//! elementwise/sparse addition, so frames can be accumulated in any
//! grouping or order (the parallel reduction relies on this).

use std::ops::AddAssign;

use crate::alignment::GlobalCostMatrix;
use crate::config::{IdAlignmentMethod, ALPHA_THRESHOLDS, NUM_ALPHAS};
use crate::cost_matrix::CostMatrixData;
use crate::sparse::{Sparse1d, Sparse2d};
use crate::{assignment, Error, Result};

/// Summable per-threshold statistics for one frame (or one video, once
/// frames are summed).
#[derive(Debug, Clone)]
pub struct HotaPrecursor {
    pub video_id: String,
    /// Originating frame; `None` for a summed per-video precursor.
    pub frame: Option<i64>,
    pub tp: [f64; NUM_ALPHAS],
    pub fn_: [f64; NUM_ALPHAS],
    pub fp: [f64; NUM_ALPHAS],
    pub loc_a: [f64; NUM_ALPHAS],
    /// Per-threshold (ref_id, comp_id) -> match count.
    pub matches_counts: [Sparse2d; NUM_ALPHAS],
    /// ref_id -> number of frames the ID appeared in.
    pub ref_id_counts: Sparse1d,
    /// comp_id -> number of frames the ID appeared in.
    pub comp_id_counts: Sparse1d,
}

impl HotaPrecursor {
    pub fn new(video_id: impl Into<String>, frame: Option<i64>) -> Self {
        Self {
            video_id: video_id.into(),
            frame,
            tp: [0.0; NUM_ALPHAS],
            fn_: [0.0; NUM_ALPHAS],
            fp: [0.0; NUM_ALPHAS],
            loc_a: [0.0; NUM_ALPHAS],
            matches_counts: std::array::from_fn(|_| Sparse2d::new()),
            ref_id_counts: Sparse1d::new(),
            comp_id_counts: Sparse1d::new(),
        }
    }
}

impl AddAssign<&HotaPrecursor> for HotaPrecursor {
    fn add_assign(&mut self, other: &HotaPrecursor) {
        for a in 0..NUM_ALPHAS {
            self.tp[a] += other.tp[a];
            self.fn_[a] += other.fn_[a];
            self.fp[a] += other.fp[a];
            self.loc_a[a] += other.loc_a[a];
            self.matches_counts[a] += &other.matches_counts[a];
        }
        self.ref_id_counts += &other.ref_id_counts;
        self.comp_id_counts += &other.comp_id_counts;
    }
}

/// Sum precursors into one per-video precursor.
pub fn sum_precursors<'a, I>(video_id: &str, precursors: I) -> HotaPrecursor
where
    I: IntoIterator<Item = &'a HotaPrecursor>,
{
    let mut total = HotaPrecursor::new(video_id, None);
    for p in precursors {
        total += p;
    }
    total
}

/// Decide this frame's matches and accumulate statistics per threshold.
pub fn accumulate_frame(
    costs: &CostMatrixData,
    global: &GlobalCostMatrix,
    method: IdAlignmentMethod,
) -> Result<HotaPrecursor> {
    let mut pre = HotaPrecursor::new(costs.video_id(), Some(costs.frame()));

    for &ref_id in costs.ref_ids() {
        pre.ref_id_counts.add_at(ref_id, 1.0);
    }
    for &comp_id in costs.comp_ids() {
        pre.comp_id_counts.add_at(comp_id, 1.0);
    }

    let candidates = match method {
        IdAlignmentMethod::Global => global_candidates(costs, global),
        IdAlignmentMethod::PerFrame => per_frame_candidates(costs, global),
    };

    // Local similarity of every candidate pair; a missing or NaN value is
    // an ID bookkeeping bug upstream, not bad input data.
    let mut similarities = Vec::with_capacity(candidates.len());
    for &(ref_id, comp_id) in &candidates {
        let sim = costs.get(ref_id, comp_id);
        if sim.is_nan() {
            return Err(Error::MissingSimilarity {
                video_id: costs.video_id().to_string(),
                frame: costs.frame(),
                ref_id,
                comp_id,
            });
        }
        similarities.push(sim);
    }

    let n_ref = costs.ref_ids().len() as f64;
    let n_comp = costs.comp_ids().len() as f64;

    for (a, &alpha) in ALPHA_THRESHOLDS.iter().enumerate() {
        let mut num_matches = 0.0;
        for (&(ref_id, comp_id), &sim) in candidates.iter().zip(&similarities) {
            // small tolerance so sims sitting exactly on a threshold count
            if sim >= alpha - f64::EPSILON {
                num_matches += 1.0;
                pre.loc_a[a] += sim;
                pre.matches_counts[a].add_at(ref_id, comp_id, 1.0);
            }
        }
        pre.tp[a] += num_matches;
        pre.fn_[a] += n_ref - num_matches;
        pre.fp[a] += n_comp - num_matches;
    }

    Ok(pre)
}

/// Candidate pairs under global alignment: the frame's restriction of the
/// video-level identity map.
fn global_candidates(costs: &CostMatrixData, global: &GlobalCostMatrix) -> Vec<(i64, i64)> {
    let map = global.ref2comp();
    costs
        .ref_ids()
        .iter()
        .filter_map(|&ref_id| {
            let comp_id = *map.get(&ref_id)?;
            costs.comp_idx(comp_id).map(|_| (ref_id, comp_id))
        })
        .collect()
}

/// Candidate pairs under per-frame alignment: re-solve the assignment on
/// local similarity weighted by the global identity score.
fn per_frame_candidates(costs: &CostMatrixData, global: &GlobalCostMatrix) -> Vec<(i64, i64)> {
    let ref_ids = costs.ref_ids();
    let comp_ids = costs.comp_ids();
    if ref_ids.is_empty() || comp_ids.is_empty() {
        return Vec::new();
    }

    let mut weighted = costs.matrix().clone();
    for (i, &ref_id) in ref_ids.iter().enumerate() {
        for (j, &comp_id) in comp_ids.iter().enumerate() {
            weighted[(i, j)] *= global.score(ref_id, comp_id);
        }
    }

    assignment::max_weight_assignment(&weighted)
        .into_iter()
        .map(|(i, j)| (ref_ids[i], comp_ids[j]))
        .collect()
}
