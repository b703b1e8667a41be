//! HyperLogLog++ cardinality sketches for §4.4.4's approximate counts.
//!
//! `MeasurementsCardinality` is defined as `sketch.Count() - tombstoneSketch.Count()`
//! over two combinable HLL++ sketches (items seen, items tombstoned). This wraps
//! the published `hyperloglogplus` crate's `HyperLogLogPlus`, the same way
//! `aerolithdb-storage::CompressionEngine` wraps an external compression library
//! behind a small owned struct rather than spreading raw library calls through
//! the rest of the codebase.

use hyperloglogplus::{HyperLogLog, HyperLogLogPlus};
use std::collections::hash_map::RandomState;
use std::hash::Hash;

use crate::error::{Error, Result};

/// Precision parameter (number of register-index bits) for every sketch this
/// crate creates. Fixed so that sketches created independently by different
/// shards remain combinable via [`Sketch::merge`].
const PRECISION: u8 = 16;

#[derive(Clone)]
pub struct Sketch {
    inner: HyperLogLogPlus<u64, RandomState>,
}

impl Sketch {
    /// A fresh, empty sketch of the default HLL++ flavor (§4.4.4: "sketches
    /// with no shards present must return empty sketches of the default
    /// flavor rather than nil").
    pub fn new() -> Self {
        let inner = HyperLogLogPlus::new(PRECISION, RandomState::new())
            .expect("fixed precision is always in HyperLogLogPlus's valid range");
        Self { inner }
    }

    pub fn insert(&mut self, series_id: u64) {
        self.inner.insert(&series_id);
    }

    pub fn insert_hashable<H: Hash + ?Sized>(&mut self, item: &H) {
        self.inner.insert_any(item);
    }

    /// Approximate count of distinct items inserted.
    pub fn count(&mut self) -> f64 {
        self.inner.count()
    }

    /// Combines `other` into `self` in place; the result estimates the
    /// cardinality of the union of both sketches' inputs.
    pub fn merge(&mut self, other: &Sketch) -> Result<()> {
        self.inner
            .merge(&other.inner)
            .map_err(|e| Error::Sketch(format!("{e:?}")))
    }
}

impl Default for Sketch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Sketch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sketch").field("precision", &PRECISION).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sketch_counts_zero() {
        let mut s = Sketch::new();
        assert!(s.count() < 1.0);
    }

    #[test]
    fn inserted_items_are_counted_approximately() {
        let mut s = Sketch::new();
        for i in 0..1000u64 {
            s.insert(i);
        }
        let count = s.count();
        assert!((900.0..1100.0).contains(&count), "count was {count}");
    }

    #[test]
    fn merge_combines_distinct_items() {
        let mut a = Sketch::new();
        let mut b = Sketch::new();
        for i in 0..500u64 {
            a.insert(i);
        }
        for i in 500..1000u64 {
            b.insert(i);
        }
        a.merge(&b).unwrap();
        let count = a.count();
        assert!((900.0..1100.0).contains(&count), "count was {count}");
    }
}
