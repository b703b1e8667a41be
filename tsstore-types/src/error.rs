//! Error taxonomy surfaced at the catalog boundary.
//!
//! Mirrors the `thiserror`-based enums already used in the sibling SaaS crate
//! of this workspace (`aerolithdb-saas::errors`): one variant per distinguishable
//! failure kind, each carrying just enough context (shard id, database/rp name,
//! path) to produce a useful message without a caller having to re-derive it.

use crate::ids::{Database, RetentionPolicy, ShardId};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("shard not found: {0}")]
    ShardNotFound(ShardId),

    #[error("store is closed")]
    StoreClosed,

    #[error("shard {0} deletion already in progress")]
    ShardDeletionInProgress(ShardId),

    #[error("database {0} has multiple index types, refusing measurement/series delete")]
    MultipleIndexTypes(Database),

    #[error("invalid shard directory name: {0:?}")]
    InvalidShardId(String),

    #[error("refusing to delete {path}: not a direct child of the store root ({reason})")]
    PathEscape { path: PathBuf, reason: &'static str },

    #[error("failed to open shard {shard}: {source}")]
    ShardOpen {
        shard: ShardId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to close shard {shard}: {source}")]
    ShardClose {
        shard: ShardId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("series file error for database {database}: {source}")]
    SeriesFile {
        database: Database,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("database {0} not found")]
    DatabaseNotFound(Database),

    #[error("retention policy {rp} not found in database {database}")]
    RetentionPolicyNotFound {
        database: Database,
        rp: RetentionPolicy,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("cardinality sketch error: {0}")]
    Sketch(String),
}

pub type Result<T> = std::result::Result<T, Error>;
