//! Compact series-id sets backed by a Roaring bitmap.
//!
//! §6.4 describes the index capability `SeriesIDSet() -> bitset`. The
//! InfluxDB-lineage Rust code in this corpus (`iox_query`, `read_buffer`) reaches
//! for `croaring` (Roaring bitmap C bindings) for exactly this role; `roaring`
//! is the equivalent pure-Rust crate and avoids a fabricated/vendored C
//! dependency. Series ids are 64-bit, so this wraps `RoaringTreemap` (roaring's
//! 64-bit variant) rather than the 32-bit `RoaringBitmap`.

use roaring::RoaringTreemap;

#[derive(Debug, Clone, Default)]
pub struct SeriesIdSet(RoaringTreemap);

impl SeriesIdSet {
    pub fn new() -> Self {
        Self(RoaringTreemap::new())
    }

    pub fn insert(&mut self, id: u64) -> bool {
        self.0.insert(id)
    }

    pub fn remove(&mut self, id: u64) -> bool {
        self.0.remove(id)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> u64 {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter()
    }

    /// In-place union with `other`.
    pub fn union_with(&mut self, other: &SeriesIdSet) {
        self.0 |= &other.0;
    }

    /// In-place subtraction: removes every id present in `other`.
    pub fn difference_with(&mut self, other: &SeriesIdSet) {
        self.0 -= &other.0;
    }

    /// Returns a new set containing every id in `self` but not in `other`.
    pub fn difference(&self, other: &SeriesIdSet) -> SeriesIdSet {
        SeriesIdSet(&self.0 - &other.0)
    }

    /// Cardinality of the union of several sets, without materializing it.
    pub fn union_cardinality<'a>(sets: impl IntoIterator<Item = &'a SeriesIdSet>) -> u64 {
        let mut acc = RoaringTreemap::new();
        for set in sets {
            acc |= &set.0;
        }
        acc.len()
    }

    pub fn from_ids(ids: impl IntoIterator<Item = u64>) -> Self {
        let mut set = Self::new();
        for id in ids {
            set.insert(id);
        }
        set
    }
}

impl FromIterator<u64> for SeriesIdSet {
    fn from_iter<T: IntoIterator<Item = u64>>(iter: T) -> Self {
        Self::from_ids(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_cardinality_matches_distinct_count() {
        let a = SeriesIdSet::from_ids([1, 2, 3]);
        let b = SeriesIdSet::from_ids([3, 4, 5]);
        assert_eq!(SeriesIdSet::union_cardinality([&a, &b]), 5);
    }

    #[test]
    fn difference_removes_shared_ids() {
        let a = SeriesIdSet::from_ids([1, 2, 3]);
        let b = SeriesIdSet::from_ids([2, 3]);
        let diff = a.difference(&b);
        assert_eq!(diff.len(), 1);
        assert!(diff.contains(1));
    }
}
