//! Dense per-frame similarity matrices keyed by raw object IDs.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Version tag written into persisted cost matrices and metric records.
pub const SCHEMA_VERSION: u32 = 1;

/// Similarity matrix for one (video, frame).
///
/// Rows follow `ref_ids`, columns follow `comp_ids`, so a value can be
/// looked up by raw ID regardless of row/column order. Values are in
/// [0, 1] with higher meaning more similar.
#[derive(Debug, Clone)]
pub struct CostMatrixData {
    ref_ids: Vec<i64>,
    comp_ids: Vec<i64>,
    matrix: DMatrix<f64>,
    video_id: String,
    frame: i64,
    ref_index: HashMap<i64, usize>,
    comp_index: HashMap<i64, usize>,
}

impl CostMatrixData {
    /// Build from ID arrays and a matching-shape matrix.
    ///
    /// Panics in debug builds if the shape disagrees with the ID arrays;
    /// shape is an internal invariant of the similarity stage.
    pub fn new(
        ref_ids: Vec<i64>,
        comp_ids: Vec<i64>,
        matrix: DMatrix<f64>,
        video_id: impl Into<String>,
        frame: i64,
    ) -> Self {
        debug_assert_eq!(matrix.nrows(), ref_ids.len());
        debug_assert_eq!(matrix.ncols(), comp_ids.len());

        let ref_index = ref_ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
        let comp_index = comp_ids.iter().enumerate().map(|(j, &id)| (id, j)).collect();
        Self {
            ref_ids,
            comp_ids,
            matrix,
            video_id: video_id.into(),
            frame,
            ref_index,
            comp_index,
        }
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

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn frame(&self) -> i64 {
        self.frame
    }

    /// Row index of a reference ID, if present.
    pub fn ref_idx(&self, ref_id: i64) -> Option<usize> {
        self.ref_index.get(&ref_id).copied()
    }

    /// Column index of a comparison ID, if present.
    pub fn comp_idx(&self, comp_id: i64) -> Option<usize> {
        self.comp_index.get(&comp_id).copied()
    }

    /// Similarity of an ID pair; NaN when either ID is absent.
    pub fn get(&self, ref_id: i64, comp_id: i64) -> f64 {
        match (self.ref_idx(ref_id), self.comp_idx(comp_id)) {
            (Some(i), Some(j)) => self.matrix[(i, j)],
            _ => f64::NAN,
        }
    }

    /// Persist as versioned JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let record = CostMatrixRecord {
            schema_version: SCHEMA_VERSION,
            ref_ids: self.ref_ids.clone(),
            comp_ids: self.comp_ids.clone(),
            rows: (0..self.matrix.nrows())
                .map(|i| self.matrix.row(i).iter().copied().collect())
                .collect(),
            video_id: self.video_id.clone(),
            frame: self.frame,
        };
        let mut file = std::fs::File::create(path)?;
        let json = serde_json::to_string_pretty(&record)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Load from versioned JSON; rejects unknown schema versions.
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<CostMatrixData> {
        let mut json = String::new();
        std::fs::File::open(path)?.read_to_string(&mut json)?;
        let record: CostMatrixRecord = serde_json::from_str(&json)?;
        if record.schema_version != SCHEMA_VERSION {
            return Err(Error::SchemaVersion {
                expected: SCHEMA_VERSION,
                got: record.schema_version,
            });
        }
        let nrows = record.ref_ids.len();
        let ncols = record.comp_ids.len();
        let flat: Vec<f64> = record.rows.into_iter().flatten().collect();
        if flat.len() != nrows * ncols {
            return Err(Error::InvalidConfig(format!(
                "cost matrix shape mismatch: {} ids x {} ids vs {} values",
                nrows,
                ncols,
                flat.len()
            )));
        }
        let matrix = DMatrix::from_row_slice(nrows, ncols, &flat);
        Ok(CostMatrixData::new(
            record.ref_ids,
            record.comp_ids,
            matrix,
            record.video_id,
            record.frame,
        ))
    }
}

#[derive(Serialize, Deserialize)]
struct CostMatrixRecord {
    schema_version: u32,
    ref_ids: Vec<i64>,
    comp_ids: Vec<i64>,
    rows: Vec<Vec<f64>>,
    video_id: String,
    frame: i64,
}
