//! Store-level statistics aggregation — spec §4.6.

use tsstore_types::{Database, DatabaseStatistics, Result, ShardId, ShardStatistics};

use crate::catalog::Catalog;
use crate::queries;

/// Per-shard statistics: a direct delegation to the shard, with no
/// aggregation (spec §4.6: "Per-shard: delegate to the shard").
pub fn shard_statistics(catalog: &Catalog, id: ShardId, tags: &[(String, String)]) -> Result<ShardStatistics> {
    catalog.ensure_open()?;
    let shard = catalog.read().shard(id).ok_or(tsstore_types::Error::ShardNotFound(id))?;
    Ok(shard.statistics(tags))
}

/// Per-database rollup: `{numSeries, numMeasurements}` from `SeriesCardinality`
/// and `MeasurementsCardinality`, tagged with the database name (spec §4.6),
/// plus the live shard count (SPEC_FULL.md §4.6 supplement).
pub fn database_statistics(catalog: &Catalog, database: &Database) -> Result<DatabaseStatistics> {
    catalog.ensure_open()?;
    let shard_count = catalog.read().shards_in_database(database).len();
    let num_series = queries::series_cardinality(catalog, database);
    let num_measurements = queries::measurements_cardinality(catalog, database)?;
    Ok(DatabaseStatistics {
        database: database.as_str().to_string(),
        num_series,
        num_measurements,
        shard_count,
    })
}
