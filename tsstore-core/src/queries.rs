//! `MeasurementNames`/`TagKeys`/`TagValues`/cardinality/sketches — spec §4.4.

use std::cmp::Reverse;
use std::collections::{BTreeSet, BinaryHeap};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tsstore_types::expr::{filter_conjuncts, is_system_name, Expr, BinaryOp, Literal, MEASUREMENT_NAME_REF};
use tsstore_types::{Authorizer, Database, Error, Result, Shard, Sketch};

use crate::catalog::Catalog;

/// A snapshot of a database's shard indexes (plus the presence of its
/// series file), gathered under the read lock — spec §4.4.1's `IndexSet`.
/// Store-side fan-out machinery, not a capability the shard/index
/// implementations provide.
pub struct IndexSet {
    shards: Vec<Arc<dyn Shard>>,
    has_series_file: bool,
}

impl IndexSet {
    pub fn snapshot(catalog: &Catalog, database: &Database) -> Self {
        let state = catalog.read();
        Self {
            shards: state.shards_in_database(database),
            has_series_file: state.series_file(database).is_some(),
        }
    }

    pub fn restricted_to(catalog: &Catalog, database: &Database, shard_ids: &[tsstore_types::ShardId]) -> Self {
        let state = catalog.read();
        Self {
            shards: state.shards_by_id(shard_ids),
            has_series_file: state.series_file(database).is_some(),
        }
    }

    pub fn shards(&self) -> &[Arc<dyn Shard>] {
        &self.shards
    }
}

fn poll_cancel(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}

/// `_name` comparisons only — the shape `filter_conjuncts` leaves a
/// measurement-expr in after splitting a condition (spec §4.4.2).
fn matches_measurement_expr(expr: &Expr, name: &str) -> bool {
    match expr {
        Expr::And(l, r) => matches_measurement_expr(l, name) && matches_measurement_expr(r, name),
        Expr::Or(l, r) => matches_measurement_expr(l, name) || matches_measurement_expr(r, name),
        Expr::Paren(e) => matches_measurement_expr(e, name),
        Expr::BinaryExpr { lhs, op, rhs } => {
            if let (Expr::Reference(r), Expr::Literal(Literal::Str(v))) = (lhs.as_ref(), rhs.as_ref()) {
                if r == MEASUREMENT_NAME_REF {
                    return match op {
                        BinaryOp::Eq => v == name,
                        BinaryOp::NotEq => v != name,
                        _ => true,
                    };
                }
            }
            true
        }
        _ => true,
    }
}

/// A tag-key/tag-value filter-expr evaluated against one `(key, value)`
/// binding at a time, over-approximating any other reference in the
/// expression as "unknown, assume match" — consistent with the conservative
/// matching spec §4.1 requires of `Guard::matches`.
fn matches_filter_expr(expr: &Expr, key: &str, value: &str) -> bool {
    match expr {
        Expr::And(l, r) => matches_filter_expr(l, key, value) && matches_filter_expr(r, key, value),
        Expr::Or(l, r) => matches_filter_expr(l, key, value) || matches_filter_expr(r, key, value),
        Expr::Paren(e) => matches_filter_expr(e, key, value),
        Expr::BinaryExpr { lhs, op, rhs } => {
            if let (Expr::Reference(k), Expr::Literal(Literal::Str(v))) = (lhs.as_ref(), rhs.as_ref()) {
                if k == key {
                    return match op {
                        BinaryOp::Eq => v == value,
                        BinaryOp::NotEq => v != value,
                        _ => true,
                    };
                }
            }
            true
        }
        _ => true,
    }
}

/// spec §4.4.1. Returns `None` if the database has no series file yet (no
/// writes have occurred).
pub async fn measurement_names(
    catalog: &Catalog,
    authorizer: &dyn Authorizer,
    database: &Database,
    expr: Option<&Expr>,
    cancel: &CancellationToken,
) -> Result<Option<Vec<String>>> {
    catalog.ensure_open()?;
    let index_set = IndexSet::snapshot(catalog, database);
    if !index_set.has_series_file {
        return Ok(None);
    }

    let mut names = BTreeSet::new();
    for shard in index_set.shards() {
        poll_cancel(cancel)?;
        names.extend(shard.index().measurement_names());
    }

    let names = names
        .into_iter()
        .filter(|name| authorizer.authorize_measurement(database.as_str(), name))
        .filter(|name| expr.map(|e| matches_measurement_expr(e, name)).unwrap_or(true))
        .collect();
    Ok(Some(names))
}

/// One `(measurement, tag keys)` result row of `TagKeys` — spec §4.4.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementTagKeys {
    pub measurement: String,
    pub keys: Vec<String>,
}

/// spec §4.4.2.
pub async fn tag_keys(
    catalog: &Catalog,
    authorizer: &dyn Authorizer,
    database: &Database,
    shard_ids: &[tsstore_types::ShardId],
    cond: Option<&Expr>,
    cancel: &CancellationToken,
) -> Result<Vec<MeasurementTagKeys>> {
    catalog.ensure_open()?;
    let index_set = IndexSet::restricted_to(catalog, database, shard_ids);

    let measurement_expr = cond.and_then(|c| filter_conjuncts(c, &|n| n == MEASUREMENT_NAME_REF));
    let filter_expr = cond.and_then(|c| filter_conjuncts(c, &|n| !is_system_name(n)));

    let mut measurement_names = BTreeSet::new();
    for shard in index_set.shards() {
        poll_cancel(cancel)?;
        measurement_names.extend(shard.index().measurement_names());
    }
    let measurement_names: Vec<String> = measurement_names
        .into_iter()
        .filter(|name| authorizer.authorize_measurement(database.as_str(), name))
        .filter(|name| measurement_expr.as_ref().map(|e| matches_measurement_expr(e, name)).unwrap_or(true))
        .collect();

    let mut results = Vec::new();
    for name in measurement_names {
        poll_cancel(cancel)?;
        let mut keys = BTreeSet::new();
        for shard in index_set.shards() {
            keys.extend(shard.index().measurement_tag_keys(&name));
        }

        let retained: Vec<String> = match &filter_expr {
            None => keys.into_iter().collect(),
            Some(fe) => keys
                .into_iter()
                .filter(|key| {
                    index_set
                        .shards()
                        .iter()
                        .flat_map(|s| s.index().measurement_tag_key_values(&name, key))
                        .any(|value| matches_filter_expr(fe, key, &value))
                })
                .collect(),
        };

        if !retained.is_empty() {
            results.push(MeasurementTagKeys { measurement: name, keys: retained });
        }
    }

    Ok(results)
}

/// One `(measurement, [(key, value), ...])` result row of `TagValues` —
/// spec §4.4.3. Sorted by `(key, value)` with no duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementTagValues {
    pub measurement: String,
    pub key_values: Vec<(String, String)>,
}

/// Merges several shards' already-sorted `(key, value)` lists for the same
/// measurement into one sorted, deduplicated list — the k-way merge of spec
/// §4.4.3. At most one entry per shard is ever live in the heap at once, so
/// the number of in-flight triples never exceeds the number of shards
/// (spec §4.4.3's invariant).
fn merge_tag_value_lists(per_shard: Vec<Vec<(String, String)>>) -> Vec<(String, String)> {
    let mut heap: BinaryHeap<Reverse<(String, String, usize, usize)>> = BinaryHeap::new();
    for (shard_idx, list) in per_shard.iter().enumerate() {
        if let Some((k, v)) = list.first() {
            heap.push(Reverse((k.clone(), v.clone(), shard_idx, 0)));
        }
    }

    let mut merged = Vec::new();
    while let Some(Reverse((key, value, shard_idx, pos))) = heap.pop() {
        if let Some((nk, nv)) = per_shard[shard_idx].get(pos + 1) {
            heap.push(Reverse((nk.clone(), nv.clone(), shard_idx, pos + 1)));
        }
        if merged.last() != Some(&(key.clone(), value.clone())) {
            merged.push((key, value));
        }
    }
    merged
}

/// spec §4.4.3. `cond` is required (non-`None`) per spec.
pub async fn tag_values(
    catalog: &Catalog,
    authorizer: &dyn Authorizer,
    database: &Database,
    shard_ids: &[tsstore_types::ShardId],
    cond: &Expr,
    cancel: &CancellationToken,
) -> Result<Vec<MeasurementTagValues>> {
    catalog.ensure_open()?;
    let index_set = IndexSet::restricted_to(catalog, database, shard_ids);

    let measurement_expr = filter_conjuncts(cond, &|n| n == MEASUREMENT_NAME_REF);
    let filter_expr = filter_conjuncts(cond, &|n| !is_system_name(n));

    let mut measurement_names = BTreeSet::new();
    for shard in index_set.shards() {
        poll_cancel(cancel)?;
        measurement_names.extend(shard.index().measurement_names());
    }
    let measurement_names: Vec<String> = measurement_names
        .into_iter()
        .filter(|name| authorizer.authorize_measurement(database.as_str(), name))
        .filter(|name| measurement_expr.as_ref().map(|e| matches_measurement_expr(e, name)).unwrap_or(true))
        .collect();

    let mut results = Vec::new();
    for name in measurement_names {
        poll_cancel(cancel)?;

        let per_shard: Vec<Vec<(String, String)>> = index_set
            .shards()
            .iter()
            .map(|shard| {
                let idx = shard.index();
                let mut pairs = Vec::new();
                for key in idx.measurement_tag_keys(&name) {
                    for value in idx.measurement_tag_key_values(&name, &key) {
                        if filter_expr.as_ref().map(|fe| matches_filter_expr(fe, &key, &value)).unwrap_or(true) {
                            pairs.push((key.clone(), value));
                        }
                    }
                }
                pairs.sort();
                pairs
            })
            .filter(|pairs| !pairs.is_empty())
            .collect();

        debug_assert!(
            per_shard.len() <= index_set.shards().len(),
            "merge input triples must never exceed the shard count"
        );

        let merged = merge_tag_value_lists(per_shard);
        if !merged.is_empty() {
            results.push(MeasurementTagValues { measurement: name, key_values: merged });
        }
    }

    Ok(results)
}

/// spec §4.4.4: exact union cardinality of a database's shard series-id sets.
pub fn series_cardinality(catalog: &Catalog, database: &Database) -> u64 {
    let shards = catalog.read().shards_in_database(database);
    let sets: Vec<_> = shards.iter().map(|s| s.index().series_id_set()).collect();
    tsstore_types::SeriesIdSet::union_cardinality(sets.iter())
}

/// spec §4.4.4: approximate measurement cardinality via combined HLL++
/// sketches. Databases with no shards yield `0.0` from two empty sketches,
/// matching "sketches with no shards present must return empty sketches of
/// the default flavor rather than nil".
pub fn measurements_cardinality(catalog: &Catalog, database: &Database) -> Result<f64> {
    let shards = catalog.read().shards_in_database(database);
    let mut items = Sketch::new();
    let mut tombstones = Sketch::new();
    for shard in &shards {
        let pair = shard.measurements_sketches()?;
        items.merge(&pair.items)?;
        tombstones.merge(&pair.tombstones)?;
    }
    Ok(items.count() - tombstones.count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_tag_value_lists_dedupes_across_shards() {
        let a = vec![("host".to_string(), "a".to_string()), ("host".to_string(), "b".to_string())];
        let b = vec![("host".to_string(), "a".to_string()), ("region".to_string(), "us".to_string())];
        let merged = merge_tag_value_lists(vec![a, b]);
        assert_eq!(
            merged,
            vec![
                ("host".to_string(), "a".to_string()),
                ("host".to_string(), "b".to_string()),
                ("region".to_string(), "us".to_string()),
            ]
        );
    }

    #[test]
    fn merge_tag_value_lists_is_sorted() {
        let a = vec![("b".to_string(), "1".to_string())];
        let b = vec![("a".to_string(), "1".to_string())];
        let merged = merge_tag_value_lists(vec![a, b]);
        assert_eq!(merged, vec![("a".to_string(), "1".to_string()), ("b".to_string(), "1".to_string())]);
    }

    proptest::proptest! {
        /// However the per-shard lists are carved up, the merge of sorted,
        /// deduplicated shard lists must itself be sorted and hold exactly
        /// the set union of its inputs, with no duplicates (spec §4.4.3).
        #[test]
        fn merge_is_sorted_deduped_union_of_inputs(
            shard_lists in proptest::collection::vec(
                proptest::collection::btree_set((0u8..6, 0u8..6), 0..8),
                0..6,
            )
        ) {
            let expected: BTreeSet<(u8, u8)> = shard_lists.iter().flatten().copied().collect();
            let per_shard: Vec<Vec<(String, String)>> = shard_lists
                .into_iter()
                .map(|set| set.into_iter().map(|(k, v)| (format!("k{k}"), format!("v{v}"))).collect())
                .collect();

            let merged = merge_tag_value_lists(per_shard);

            let mut sorted = merged.clone();
            sorted.sort();
            prop_assert_eq!(&merged, &sorted, "merge output must be sorted");

            let deduped: BTreeSet<_> = merged.iter().cloned().collect();
            prop_assert_eq!(merged.len(), deduped.len(), "merge output must not contain duplicates");

            let actual: BTreeSet<(u8, u8)> = merged
                .iter()
                .map(|(k, v)| (k.trim_start_matches('k').parse().unwrap(), v.trim_start_matches('v').parse().unwrap()))
                .collect();
            prop_assert_eq!(actual, expected, "merge output must equal the union of its inputs");
        }
    }
}
