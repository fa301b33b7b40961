//! End-to-end evaluation pipeline over multi-video detection tables.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::alignment::GlobalCostMatrix;
use crate::config::HotaConfig;
use crate::detection::{extract_frame_pairs, DetectionTable};
use crate::executor::TaskExecutor;
use crate::metrics::HotaRecord;
use crate::precursor::{accumulate_frame, sum_precursors, HotaPrecursor};
use crate::similarity::frame_cost_matrix;
use crate::Result;

/// Everything one evaluation run produces.
#[derive(Debug, Clone)]
pub struct HotaResults {
    global: HotaRecord,
    per_video: Vec<HotaRecord>,
    per_frame: HashMap<String, Vec<HotaPrecursor>>,
}

impl HotaResults {
    /// Record merged across every evaluated video.
    pub fn global_record(&self) -> &HotaRecord {
        &self.global
    }

    /// One record per video, ordered by video ID.
    pub fn per_video_records(&self) -> &[HotaRecord] {
        &self.per_video
    }

    pub fn video_record(&self, video_id: &str) -> Option<&HotaRecord> {
        self.per_video.iter().find(|r| r.video_id() == video_id)
    }

    /// Raw per-frame precursors, keyed by video ID and ordered by frame.
    pub fn per_frame_precursors(&self) -> &HashMap<String, Vec<HotaPrecursor>> {
        &self.per_frame
    }
}

/// Multi-video HOTA evaluation driver.
///
/// Owns a validated config and a worker pool; `evaluate` may be called
/// repeatedly with different table sets.
pub struct HotaEvaluator {
    config: HotaConfig,
    executor: TaskExecutor,
}

impl HotaEvaluator {
    pub fn new(config: HotaConfig) -> Result<HotaEvaluator> {
        config.validate()?;
        let executor = TaskExecutor::new(config.n_workers)?;
        Ok(HotaEvaluator { config, executor })
    }

    pub fn config(&self) -> &HotaConfig {
        &self.config
    }

    /// Evaluate comparison tables against reference tables.
    ///
    /// The set of videos is the reference's; a video with no comparison
    /// table is scored against an empty one (all misses) rather than
    /// failing the run. Comparison-only videos are ignored with a warning.
    pub fn evaluate(
        &self,
        reference: &HashMap<String, DetectionTable>,
        comparison: &HashMap<String, DetectionTable>,
    ) -> Result<HotaResults> {
        let start = Instant::now();

        let mut video_ids: Vec<&String> = reference.keys().collect();
        video_ids.sort_unstable();
        for extra in comparison.keys().filter(|v| !reference.contains_key(*v)) {
            warn!(video_id = %extra, "comparison video has no reference table, skipping");
        }

        let empty = DetectionTable::empty();
        let mut per_video = Vec::with_capacity(video_ids.len());
        let mut per_frame = HashMap::with_capacity(video_ids.len());

        for video_id in video_ids {
            let comp = match comparison.get(video_id) {
                Some(table) => table,
                None => {
                    warn!(video_id = %video_id, "no comparison detections, scoring against empty table");
                    &empty
                }
            };
            let (record, precursors) =
                self.evaluate_video(video_id, &reference[video_id], comp)?;
            per_video.push(record);
            per_frame.insert(video_id.clone(), precursors);
        }

        let global = HotaRecord::merge(&per_video)?;
        info!(
            videos = per_video.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            hota = global.scalars().hota,
            "evaluation finished"
        );

        Ok(HotaResults {
            global,
            per_video,
            per_frame,
        })
    }

    fn evaluate_video(
        &self,
        video_id: &str,
        reference: &DetectionTable,
        comparison: &DetectionTable,
    ) -> Result<(HotaRecord, Vec<HotaPrecursor>)> {
        let start = Instant::now();
        let reference = reference.filter_class(self.config.class_id);
        let comparison = comparison.filter_class(self.config.class_id);

        let pairs = extract_frame_pairs(video_id, &reference, &comparison)?;

        let metric = self.config.similarity_metric;
        let geo_max = self.config.geo_max_distance_m;
        let costs = self
            .executor
            .map(&pairs, |pair| frame_cost_matrix(pair, metric, geo_max))?;

        let global = GlobalCostMatrix::build(video_id, &costs);

        let method = self.config.id_alignment_method;
        let precursors = self
            .executor
            .map(&costs, |frame| accumulate_frame(frame, &global, method))?;

        let total = sum_precursors(video_id, precursors.iter());
        let record = HotaRecord::from_precursor(&total, &global);

        debug!(
            video_id = %video_id,
            frames = pairs.len(),
            ref_ids = global.ref_ids().len(),
            comp_ids = global.comp_ids().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "video evaluated"
        );
        Ok((record, precursors))
    }
}
