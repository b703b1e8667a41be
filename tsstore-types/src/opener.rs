//! The shard/series-file construction capability the Store is handed.
//!
//! Spec §1 treats the storage engine behind `Shard`/`SeriesFile` as opaque;
//! `Loader` and `CreateShard` still need *some* way to construct one for a
//! given `(database, retention_policy, id)` without this crate knowing what
//! engine backs it. `ShardOpener` is that seam — analogous to the `Shard`/
//! `Index`/`SeriesFile` capability interfaces, grounded on the same
//! trait-object-over-inheritance instruction in spec §9.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::ids::{Database, RetentionPolicy, ShardId};
use crate::limiter::{Limiter, RateLimiter};
use crate::seriesfile::SeriesFile;
use crate::shard::Shard;

#[async_trait]
pub trait ShardOpener: Send + Sync {
    /// Opens (creating if absent) the series file for `database` at `path`.
    async fn open_series_file(&self, database: &Database, path: &Path) -> Result<Arc<dyn SeriesFile>>;

    /// Constructs and opens the shard at `path`/`wal_path`, already bound to
    /// `sfile`. `enabled` mirrors spec §4.2 step 3/§6.2's `Open(enabled)`.
    /// `compaction_limiter`/`compaction_rate_limiter` are the catalog's shared
    /// compaction-concurrency and throughput bounds (spec §2/§5) — a concrete
    /// engine acquires from them around its own compaction work; this crate's
    /// opaque `Shard` interface has no other seam through which they could
    /// reach the engine that actually performs compactions.
    #[allow(clippy::too_many_arguments)]
    async fn open_shard(
        &self,
        id: ShardId,
        database: &Database,
        rp: &RetentionPolicy,
        path: &Path,
        wal_path: &Path,
        sfile: Arc<dyn SeriesFile>,
        enabled: bool,
        compaction_limiter: Limiter,
        compaction_rate_limiter: Arc<RateLimiter>,
    ) -> Result<Arc<dyn Shard>>;
}
