//! The §6.2 `Shard` capability interface.
//!
//! The Store treats a shard as an opaque storage engine — TSM files, WAL,
//! compaction, the per-shard index are all out of scope (spec §1). This trait
//! is exactly the surface the Store needs to drive a shard through its
//! lifecycle, matching spec §6.2's consumed-interface list. Grounded on the
//! teacher's "uniform handle over heterogeneous subsystems" shape
//! (`StorageHierarchy` holding `Arc<MemoryCache>`/`Arc<LocalSSDCache>`/... behind
//! matching `start()/stop()/store()/get()` signatures), generalized here to a
//! trait object per spec §9's instruction to avoid inheritance in favor of
//! capability interfaces.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::bitset::SeriesIdSet;
use crate::error::Result;
use crate::ids::{Database, RetentionPolicy, ShardId};
use crate::index::Index;
use crate::seriesfile::SeriesFile;
use crate::sketch::Sketch;
use crate::stats::ShardStatistics;

/// A pair of combinable sketches: items actually present, and items
/// tombstoned (deleted) — `MeasurementsCardinality` is `items.count() -
/// tombstones.count()` (spec §4.4.4).
#[derive(Debug, Clone, Default)]
pub struct SketchPair {
    pub items: Sketch,
    pub tombstones: Sketch,
}

#[async_trait]
pub trait Shard: Send + Sync {
    fn id(&self) -> ShardId;
    fn database(&self) -> &Database;
    fn retention_policy(&self) -> &RetentionPolicy;
    fn path(&self) -> &Path;
    fn wal_path(&self) -> &Path;
    fn index_type(&self) -> &str;

    /// Opens the on-disk shard. `enabled` mirrors spec §4.2 step 3: the
    /// `Loader` constructs shards with writes/reads disabled, then enables
    /// them once every shard in the batch has finished opening.
    async fn open(&self, enabled: bool) -> Result<()>;
    async fn close(&self) -> Result<()>;

    fn set_enabled(&self, enabled: bool);
    fn set_compactions_enabled(&self, enabled: bool);
    fn is_idle(&self) -> bool;
    /// Releases caches/in-memory resources held by an idle shard (§4.5).
    fn free(&self) -> Result<()>;

    async fn write_points(&self, points: &dyn WritePreview) -> Result<()>;
    async fn delete_measurement(&self, name: &str) -> Result<()>;
    async fn delete_series_range(&self, series_ids: &SeriesIdSet, min_time: i64, max_time: i64) -> Result<()>;

    fn index(&self) -> Arc<dyn Index>;
    fn series_file(&self) -> Arc<dyn SeriesFile>;
    fn series_n(&self) -> i64;

    fn statistics(&self, tags: &[(String, String)]) -> ShardStatistics;
    fn disk_size(&self) -> u64;
    fn series_sketches(&self) -> Result<SketchPair>;
    fn measurements_sketches(&self) -> Result<SketchPair>;

    async fn create_snapshot(&self, skip_cache_ok: bool) -> Result<PathBuf>;
    async fn backup(&self, w: &mut (dyn AsyncWrite + Unpin + Send), since: i64) -> Result<()>;
    async fn export(&self, w: &mut (dyn AsyncWrite + Unpin + Send), start: i64, end: i64) -> Result<()>;
    async fn restore(&self, r: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()>;
    async fn import(&self, r: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()>;
    async fn digest(&self) -> Result<Vec<u8>>;
}

/// A read-only preview of a write batch: its time bounds and the set of
/// measurement names it touches. [`crate::epoch::Guard::matches`] only needs
/// this much to decide whether a writer must wait on a pending delete (§4.1) —
/// the Store never needs to see the points themselves, so the wire format of
/// an actual point batch is entirely the shard implementation's business.
pub trait WritePreview: Send + Sync {
    fn min_time(&self) -> i64;
    fn max_time(&self) -> i64;
    /// Measurement names present in the batch.
    fn measurement_names(&self) -> &[String];
    /// Lets a concrete shard implementation recover its own point-batch type
    /// via `downcast_ref`, since `WritePreview` itself exposes only the
    /// time/measurement summary `Guard::matches` needs.
    fn as_any(&self) -> &dyn std::any::Any;
}
