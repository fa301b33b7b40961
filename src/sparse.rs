//! Sparse accumulators keyed by raw object IDs.
//!
//! A video's ID universe can be large and mostly disjoint between frames, so
//! per-ID counts are kept in hash maps with an implicit default of zero
//! instead of materializing an ID x ID matrix.

use std::collections::HashMap;
use std::ops::AddAssign;

/// Sparse vector: object ID -> count, default zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sparse1d {
    values: HashMap<i64, f64>,
}

impl Sparse1d {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `v` to the entry at `i`, creating it if absent.
    pub fn add_at(&mut self, i: i64, v: f64) {
        *self.values.entry(i).or_insert(0.0) += v;
    }

    /// Value at `i`, zero if never touched.
    pub fn get(&self, i: i64) -> f64 {
        self.values.get(&i).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl AddAssign<&Sparse1d> for Sparse1d {
    fn add_assign(&mut self, other: &Sparse1d) {
        for (i, v) in other.iter() {
            self.add_at(i, v);
        }
    }
}

/// Sparse matrix: (ref ID, comp ID) -> count, default zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sparse2d {
    values: HashMap<(i64, i64), f64>,
}

impl Sparse2d {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `v` to the entry at `(i, j)`, creating it if absent.
    pub fn add_at(&mut self, i: i64, j: i64, v: f64) {
        *self.values.entry((i, j)).or_insert(0.0) += v;
    }

    /// Value at `(i, j)`, zero if never touched.
    pub fn get(&self, i: i64, j: i64) -> f64 {
        self.values.get(&(i, j)).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = ((i64, i64), f64)> + '_ {
        self.values.iter().map(|(&k, &v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl AddAssign<&Sparse2d> for Sparse2d {
    fn add_assign(&mut self, other: &Sparse2d) {
        for ((i, j), v) in other.iter() {
            self.add_at(i, j, v);
        }
    }
}
