//! The §6.4 `Index` capability interface.
//!
//! Per-shard index internals (inmem vs tsi1 layout) are out of scope (spec
//! §1); the Store only needs the enumeration/lookup surface spec §6.4 names,
//! plus the tag-key/tag-value enumeration a real index exposes and that
//! `TagKeys`/`TagValues` (§4.4.2/§4.4.3) cannot be implemented without — the
//! distilled spec names the two query operations but leaves the index
//! capability behind them implicit; this crate makes it explicit rather than
//! reinventing series-file internals to fake it (see DESIGN.md).

use crate::bitset::SeriesIdSet;
use crate::error::Result;
use crate::expr::Expr;

pub trait Index: Send + Sync {
    /// The set of every series id known to this shard's index.
    fn series_id_set(&self) -> SeriesIdSet;

    /// All measurement names in this shard's index, sorted.
    fn measurement_names(&self) -> Vec<String>;

    /// Series ids belonging to measurement `name`.
    fn measurement_series_ids(&self, name: &str) -> SeriesIdSet;

    /// Series ids belonging to measurement `name` that additionally satisfy
    /// `expr` (an already-reduced filter expression, or `None` for "all").
    fn measurement_series_by_expr_ids(&self, name: &str, expr: Option<&Expr>) -> Result<SeriesIdSet>;

    /// Tag keys present on any series of measurement `name`, sorted.
    fn measurement_tag_keys(&self, name: &str) -> Vec<String>;

    /// Tag values for `key` on any series of measurement `name`, sorted,
    /// deduplicated.
    fn measurement_tag_key_values(&self, name: &str, key: &str) -> Vec<String>;
}
