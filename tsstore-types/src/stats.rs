//! Per-shard and per-database statistics records (spec §4.6, expanded in
//! SPEC_FULL.md §3/§4.6).

use crate::ids::{Database, RetentionPolicy, ShardId};

#[derive(Debug, Clone, Default)]
pub struct ShardStatistics {
    pub database: String,
    pub retention_policy: String,
    pub shard_id: u64,
    pub series_n: i64,
    pub disk_size_bytes: u64,
    pub tags: Vec<(String, String)>,
}

/// Per-database rollup: exact series cardinality, approximate measurement
/// cardinality, and a live shard count (the SPEC_FULL.md §4.6 supplement).
#[derive(Debug, Clone, Default)]
pub struct DatabaseStatistics {
    pub database: String,
    pub num_series: u64,
    pub num_measurements: f64,
    pub shard_count: usize,
}

impl ShardStatistics {
    pub fn new(database: &Database, rp: &RetentionPolicy, shard_id: ShardId) -> Self {
        Self {
            database: database.as_str().to_string(),
            retention_policy: rp.as_str().to_string(),
            shard_id: shard_id.get(),
            series_n: 0,
            disk_size_bytes: 0,
            tags: Vec::new(),
        }
    }
}
