//! Final HOTA-family metric records and cross-video merging.

use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::alignment::GlobalCostMatrix;
use crate::config::NUM_ALPHAS;
use crate::cost_matrix::SCHEMA_VERSION;
use crate::precursor::HotaPrecursor;
use crate::{Error, Result};

/// Floor used for LocA numerators and denominators.
const LOC_EPS: f64 = 1e-10;

/// Video id used for the record merged across all videos.
pub const COMBINED_VIDEO_ID: &str = "COMBINED";

/// Finalized per-video (or merged) metrics, one entry per threshold.
///
/// Created once from a summed precursor and immutable afterwards; merging
/// produces a new record. Only the HOTA family is computed here — callers
/// that report IDF1 obtain it elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct HotaRecord {
    video_id: String,
    pub tp: [f64; NUM_ALPHAS],
    pub fn_: [f64; NUM_ALPHAS],
    pub fp: [f64; NUM_ALPHAS],
    pub det_a: [f64; NUM_ALPHAS],
    pub det_re: [f64; NUM_ALPHAS],
    pub det_pr: [f64; NUM_ALPHAS],
    pub ass_a: [f64; NUM_ALPHAS],
    pub ass_re: [f64; NUM_ALPHAS],
    pub ass_pr: [f64; NUM_ALPHAS],
    pub loc_a: [f64; NUM_ALPHAS],
    pub hota: [f64; NUM_ALPHAS],
    pub owta: [f64; NUM_ALPHAS],
}

impl HotaRecord {
    fn zeroed(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            tp: [0.0; NUM_ALPHAS],
            fn_: [0.0; NUM_ALPHAS],
            fp: [0.0; NUM_ALPHAS],
            det_a: [0.0; NUM_ALPHAS],
            det_re: [0.0; NUM_ALPHAS],
            det_pr: [0.0; NUM_ALPHAS],
            ass_a: [0.0; NUM_ALPHAS],
            ass_re: [0.0; NUM_ALPHAS],
            ass_pr: [0.0; NUM_ALPHAS],
            loc_a: [0.0; NUM_ALPHAS],
            hota: [0.0; NUM_ALPHAS],
            owta: [0.0; NUM_ALPHAS],
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    /// Finalize a video's summed precursor into a metric record.
    ///
    /// The global cost matrix bounds the video's ID universe; the sparse
    /// association accumulators are folded against the presence counts
    /// without ever building an ID x ID matrix over multiple videos.
    pub fn from_precursor(pre: &HotaPrecursor, global: &GlobalCostMatrix) -> HotaRecord {
        let mut rec = HotaRecord::zeroed(global.video_id());
        rec.tp = pre.tp;
        rec.fn_ = pre.fn_;
        rec.fp = pre.fp;

        for a in 0..NUM_ALPHAS {
            // sum in fixed key order: float addition is order-sensitive at
            // the last ulp, and hash-map iteration order varies per run
            let mut matched: Vec<((i64, i64), f64)> = pre.matches_counts[a].iter().collect();
            matched.sort_unstable_by_key(|&(key, _)| key);

            let mut ass_a_sum = 0.0;
            let mut ass_re_sum = 0.0;
            let mut ass_pr_sum = 0.0;
            for ((ref_id, comp_id), m) in matched {
                let ref_count = pre.ref_id_counts.get(ref_id);
                let comp_count = pre.comp_id_counts.get(comp_id);
                ass_a_sum += m * (m / (ref_count + comp_count - m).max(1.0));
                ass_re_sum += m * (m / ref_count.max(1.0));
                ass_pr_sum += m * (m / comp_count.max(1.0));
            }
            let tp = rec.tp[a].max(1.0);
            rec.ass_a[a] = ass_a_sum / tp;
            rec.ass_re[a] = ass_re_sum / tp;
            rec.ass_pr[a] = ass_pr_sum / tp;

            rec.loc_a[a] = pre.loc_a[a].max(LOC_EPS) / rec.tp[a].max(LOC_EPS);
        }

        rec.finalize();
        rec
    }

    /// Recompute the detection ratios and combined scores from counts and
    /// association accuracy.
    fn finalize(&mut self) {
        for a in 0..NUM_ALPHAS {
            let tp = self.tp[a];
            self.det_re[a] = tp / (tp + self.fn_[a]).max(1.0);
            self.det_pr[a] = tp / (tp + self.fp[a]).max(1.0);
            self.det_a[a] = tp / (tp + self.fn_[a] + self.fp[a]).max(1.0);
            self.hota[a] = (self.det_a[a] * self.ass_a[a]).sqrt();
            self.owta[a] = (self.det_re[a] * self.ass_a[a]).sqrt();
        }
    }

    /// Merge per-video records into one combined record.
    ///
    /// Counts sum across videos; association ratios and LocA are
    /// TP-weighted averages; the detection ratios and combined scores are
    /// re-derived from the merged counts so the record stays internally
    /// consistent. Merging a single record returns it unchanged.
    pub fn merge(records: &[HotaRecord]) -> Result<HotaRecord> {
        match records {
            [] => Err(Error::EmptyMerge),
            [only] => Ok(only.clone()),
            _ => {
                let mut merged = HotaRecord::zeroed(COMBINED_VIDEO_ID);
                for rec in records {
                    for a in 0..NUM_ALPHAS {
                        merged.tp[a] += rec.tp[a];
                        merged.fn_[a] += rec.fn_[a];
                        merged.fp[a] += rec.fp[a];
                    }
                }
                for a in 0..NUM_ALPHAS {
                    let mut ass_a = 0.0;
                    let mut ass_re = 0.0;
                    let mut ass_pr = 0.0;
                    let mut loc_a = 0.0;
                    for rec in records {
                        ass_a += rec.ass_a[a] * rec.tp[a];
                        ass_re += rec.ass_re[a] * rec.tp[a];
                        ass_pr += rec.ass_pr[a] * rec.tp[a];
                        loc_a += rec.loc_a[a] * rec.tp[a];
                    }
                    let tp = merged.tp[a].max(1.0);
                    merged.ass_a[a] = ass_a / tp;
                    merged.ass_re[a] = ass_re / tp;
                    merged.ass_pr[a] = ass_pr / tp;
                    merged.loc_a[a] = loc_a.max(LOC_EPS) / merged.tp[a].max(LOC_EPS);
                }
                merged.finalize();
                Ok(merged)
            }
        }
    }

    /// Leaderboard-facing scalars: each threshold array averaged to one
    /// number.
    pub fn scalars(&self) -> ScalarMetrics {
        ScalarMetrics {
            hota: mean(&self.hota),
            det_a: mean(&self.det_a),
            det_re: mean(&self.det_re),
            det_pr: mean(&self.det_pr),
            ass_a: mean(&self.ass_a),
            ass_re: mean(&self.ass_re),
            ass_pr: mean(&self.ass_pr),
            loc_a: mean(&self.loc_a),
            owta: mean(&self.owta),
        }
    }

    /// Persist as versioned JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file_rec = HotaRecordFile {
            schema_version: SCHEMA_VERSION,
            video_id: self.video_id.clone(),
            tp: self.tp.to_vec(),
            fn_: self.fn_.to_vec(),
            fp: self.fp.to_vec(),
            det_a: self.det_a.to_vec(),
            det_re: self.det_re.to_vec(),
            det_pr: self.det_pr.to_vec(),
            ass_a: self.ass_a.to_vec(),
            ass_re: self.ass_re.to_vec(),
            ass_pr: self.ass_pr.to_vec(),
            loc_a: self.loc_a.to_vec(),
            hota: self.hota.to_vec(),
            owta: self.owta.to_vec(),
        };
        let mut file = std::fs::File::create(path)?;
        let json = serde_json::to_string_pretty(&file_rec)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Load from versioned JSON; rejects unknown schema versions.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<HotaRecord> {
        let mut json = String::new();
        std::fs::File::open(path)?.read_to_string(&mut json)?;
        let file_rec: HotaRecordFile = serde_json::from_str(&json)?;
        if file_rec.schema_version != SCHEMA_VERSION {
            return Err(Error::SchemaVersion {
                expected: SCHEMA_VERSION,
                got: file_rec.schema_version,
            });
        }

        let mut rec = HotaRecord::zeroed(file_rec.video_id);
        copy_array(&file_rec.tp, &mut rec.tp)?;
        copy_array(&file_rec.fn_, &mut rec.fn_)?;
        copy_array(&file_rec.fp, &mut rec.fp)?;
        copy_array(&file_rec.det_a, &mut rec.det_a)?;
        copy_array(&file_rec.det_re, &mut rec.det_re)?;
        copy_array(&file_rec.det_pr, &mut rec.det_pr)?;
        copy_array(&file_rec.ass_a, &mut rec.ass_a)?;
        copy_array(&file_rec.ass_re, &mut rec.ass_re)?;
        copy_array(&file_rec.ass_pr, &mut rec.ass_pr)?;
        copy_array(&file_rec.loc_a, &mut rec.loc_a)?;
        copy_array(&file_rec.hota, &mut rec.hota)?;
        copy_array(&file_rec.owta, &mut rec.owta)?;
        Ok(rec)
    }
}

/// Threshold-averaged scalar metrics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarMetrics {
    pub hota: f64,
    pub det_a: f64,
    pub det_re: f64,
    pub det_pr: f64,
    pub ass_a: f64,
    pub ass_re: f64,
    pub ass_pr: f64,
    pub loc_a: f64,
    pub owta: f64,
}

fn mean(values: &[f64; NUM_ALPHAS]) -> f64 {
    values.iter().sum::<f64>() / NUM_ALPHAS as f64
}

fn copy_array(src: &[f64], dst: &mut [f64; NUM_ALPHAS]) -> Result<()> {
    if src.len() != NUM_ALPHAS {
        return Err(Error::InvalidConfig(format!(
            "metric array length {} does not match threshold sweep length {}",
            src.len(),
            NUM_ALPHAS
        )));
    }
    dst.copy_from_slice(src);
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct HotaRecordFile {
    schema_version: u32,
    video_id: String,
    tp: Vec<f64>,
    #[serde(rename = "fn")]
    fn_: Vec<f64>,
    fp: Vec<f64>,
    det_a: Vec<f64>,
    det_re: Vec<f64>,
    det_pr: Vec<f64>,
    ass_a: Vec<f64>,
    ass_re: Vec<f64>,
    ass_pr: Vec<f64>,
    loc_a: Vec<f64>,
    hota: Vec<f64>,
    owta: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IdAlignmentMethod, NUM_ALPHAS};
    use crate::cost_matrix::CostMatrixData;
    use crate::precursor::{accumulate_frame, sum_precursors};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    fn costs(ref_ids: Vec<i64>, comp_ids: Vec<i64>, values: &[f64], frame: i64) -> CostMatrixData {
        let matrix = DMatrix::from_row_slice(ref_ids.len(), comp_ids.len(), values);
        CostMatrixData::new(ref_ids, comp_ids, matrix, "v", frame)
    }

    fn record_for(frames: &[CostMatrixData]) -> HotaRecord {
        let global = GlobalCostMatrix::build("v", frames);
        let pres: Vec<_> = frames
            .iter()
            .map(|f| accumulate_frame(f, &global, IdAlignmentMethod::Global).unwrap())
            .collect();
        let total = sum_precursors("v", pres.iter());
        HotaRecord::from_precursor(&total, &global)
    }

    #[test]
    fn test_perfect_tracking_scores_one() {
        let frames: Vec<_> = (0..5)
            .map(|f| costs(vec![1, 2], vec![1, 2], &[1.0, 0.0, 0.0, 1.0], f))
            .collect();
        let rec = record_for(&frames);

        for a in 0..NUM_ALPHAS {
            assert_relative_eq!(rec.tp[a], 10.0);
            assert_relative_eq!(rec.fn_[a], 0.0);
            assert_relative_eq!(rec.fp[a], 0.0);
            assert_relative_eq!(rec.det_a[a], 1.0, epsilon = 1e-9);
            assert_relative_eq!(rec.ass_a[a], 1.0, epsilon = 1e-9);
            assert_relative_eq!(rec.loc_a[a], 1.0, epsilon = 1e-9);
            assert_relative_eq!(rec.hota[a], 1.0, epsilon = 1e-9);
            assert_relative_eq!(rec.owta[a], 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_empty_comparison_scores_zero() {
        let frames: Vec<_> = (0..4).map(|f| costs(vec![1, 2], vec![], &[], f)).collect();
        let rec = record_for(&frames);

        for a in 0..NUM_ALPHAS {
            assert_relative_eq!(rec.tp[a], 0.0);
            assert_relative_eq!(rec.fp[a], 0.0);
            assert_relative_eq!(rec.fn_[a], 8.0);
            assert_relative_eq!(rec.det_re[a], 0.0);
            assert_relative_eq!(rec.det_a[a], 0.0);
            assert_relative_eq!(rec.hota[a], 0.0);
        }
    }

    #[test]
    fn test_identity_swap_penalized_under_global_alignment() {
        // One object tracked by ID 10 for 4 frames, then by ID 20 for 4
        // more. The global map can keep only one tracker ID, so half the
        // frames become misses plus false positives.
        let mut frames = Vec::new();
        for f in 0..4 {
            frames.push(costs(vec![1], vec![10], &[1.0], f));
        }
        for f in 4..8 {
            frames.push(costs(vec![1], vec![20], &[1.0], f));
        }
        let rec = record_for(&frames);

        for a in 0..NUM_ALPHAS {
            assert_relative_eq!(rec.tp[a], 4.0);
            assert_relative_eq!(rec.fn_[a], 4.0);
            assert_relative_eq!(rec.fp[a], 4.0);
            assert_relative_eq!(rec.det_a[a], 1.0 / 3.0, epsilon = 1e-9);
            // matched pair counted in 4 frames: 4 * (4 / (8 + 4 - 4)) / 4
            assert_relative_eq!(rec.ass_a[a], 0.5, epsilon = 1e-9);
            assert_relative_eq!(rec.hota[a], (0.5f64 / 3.0).sqrt(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_merge_single_record_is_identity() {
        let frames = vec![costs(vec![1], vec![1], &[0.8], 0)];
        let rec = record_for(&frames);
        let merged = HotaRecord::merge(std::slice::from_ref(&rec)).unwrap();
        assert_eq!(merged, rec);
    }

    #[test]
    fn test_merge_empty_is_error() {
        assert!(matches!(HotaRecord::merge(&[]), Err(Error::EmptyMerge)));
    }

    #[test]
    fn test_merge_sums_counts_and_weights_association() {
        let rec_a = record_for(&[costs(vec![1, 2], vec![1, 2], &[1.0, 0.0, 0.0, 1.0], 0)]);
        let rec_b = record_for(&[costs(vec![3], vec![], &[], 0)]);
        let merged = HotaRecord::merge(&[rec_a.clone(), rec_b]).unwrap();

        assert_eq!(merged.video_id(), COMBINED_VIDEO_ID);
        for a in 0..NUM_ALPHAS {
            assert_relative_eq!(merged.tp[a], 2.0);
            assert_relative_eq!(merged.fn_[a], 1.0);
            assert_relative_eq!(merged.fp[a], 0.0);
            // rec_b contributes zero TP weight, so AssA stays rec_a's
            assert_relative_eq!(merged.ass_a[a], rec_a.ass_a[a], epsilon = 1e-9);
            // detection ratios recomputed from merged counts
            assert_relative_eq!(merged.det_a[a], 2.0 / 3.0, epsilon = 1e-9);
            assert_relative_eq!(
                merged.hota[a],
                (merged.det_a[a] * merged.ass_a[a]).sqrt(),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn test_scalars_average_the_sweep() {
        let frames = vec![costs(vec![1], vec![1], &[0.5], 0)];
        let rec = record_for(&frames);
        let scalars = rec.scalars();
        // matched for the 10 thresholds at or below 0.5, miss above
        assert_relative_eq!(
            scalars.det_a,
            rec.det_a.iter().sum::<f64>() / NUM_ALPHAS as f64,
            epsilon = 1e-12
        );
        assert!(scalars.hota > 0.0 && scalars.hota < 1.0);
    }

    #[test]
    fn test_records_are_bitwise_stable_across_builds() {
        // Enough matched pairs that the association sums involve many
        // terms; independently built sparse accumulators must still
        // finalize to exactly equal records.
        let build = || {
            let mut frames = Vec::new();
            for f in 0..8i64 {
                let ref_ids: Vec<i64> = (0..12).collect();
                let comp_ids: Vec<i64> = (100..112).collect();
                let mut values = vec![0.0; 144];
                for i in 0..12usize {
                    values[i * 12 + i] = 0.3 + 0.05 * ((i + f as usize) % 7) as f64;
                }
                frames.push(costs(ref_ids, comp_ids, &values, f));
            }
            record_for(&frames)
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn test_wrong_schema_version_rejected() {
        let rec = record_for(&[costs(vec![1], vec![1], &[0.9], 0)]);
        let dir = std::env::temp_dir().join("reid_hota_record_schema_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("record.json");

        rec.save_json(&path).unwrap();
        let json = std::fs::read_to_string(&path)
            .unwrap()
            .replace("\"schema_version\": 1", "\"schema_version\": 999");
        std::fs::write(&path, json).unwrap();

        let err = HotaRecord::load_json(&path).unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaVersion {
                expected: SCHEMA_VERSION,
                got: 999
            }
        ));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_json_round_trip() {
        let rec = record_for(&[costs(vec![1, 2], vec![1, 2], &[0.9, 0.0, 0.0, 0.7], 0)]);
        let dir = std::env::temp_dir().join("reid_hota_record_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("record.json");

        rec.save_json(&path).unwrap();
        let loaded = HotaRecord::load_json(&path).unwrap();
        assert_eq!(loaded, rec);

        std::fs::remove_file(&path).unwrap();
    }
}
