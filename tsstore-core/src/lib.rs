//! `tsstore-core` — the Store: the top-level coordinator of a time-series
//! database's on-disk data (spec §1).
//!
//! Owns the catalog of shards grouped by `(database, retention_policy)` and
//! the per-database series files; coordinates parallel shard loading,
//! lifecycle operations, cross-shard queries, idle-shard monitoring, and
//! backup/restore dispatch. The storage engine behind `Shard`/`SeriesFile`,
//! query planning/expression evaluation, and every outer surface (HTTP/CLI/
//! config loading/logging setup) are out of scope — this crate only drives
//! those collaborators through the capability interfaces in `tsstore-types`.

pub mod catalog;
pub mod database_state;
pub mod epoch;
pub mod lifecycle;
pub mod loader;
pub mod monitor;
pub mod paths;
pub mod queries;
pub mod stats;

mod backup;

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use tsstore_types::expr::Expr;
use tsstore_types::{AllowAll, Authorizer, Database, DatabaseStatistics, RetentionPolicy, Result, Shard, ShardId, ShardOpener, ShardStatistics, StoreConfig, WritePreview};

use catalog::Catalog;
use queries::{MeasurementTagKeys, MeasurementTagValues};

/// The Store. Cheaply cloneable (everything behind `Arc`s internally) —
/// construct once per process via [`Store::open`].
pub struct Store {
    catalog: Arc<Catalog>,
    monitor: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Store {
    /// Opens the catalog from `config.data_root`, loading every shard it
    /// finds in parallel (spec §4.2), then starts the idle-shard monitor
    /// (spec §4.5) in the background.
    pub async fn open(config: StoreConfig, opener: Arc<dyn ShardOpener>) -> Result<Arc<Self>> {
        let catalog = Arc::new(Catalog::new(config));
        loader::load(&catalog, opener).await?;

        let monitor = if catalog.config().monitor_enabled {
            Some(tokio::spawn(monitor::run(catalog.clone())))
        } else {
            None
        };

        info!("store opened");
        Ok(Arc::new(Self { catalog, monitor: std::sync::Mutex::new(monitor) }))
    }

    /// Signals close (unblocking any in-flight write/delete waiting on a
    /// guard — they surface `Error::Cancelled`, not a hang), closes every
    /// open shard and series file (best-effort — siblings still close on a
    /// sibling's error), and waits for the monitor loop to exit. Runs
    /// without `ensure_open`'s gate, since it *is* the shutdown path that
    /// gate exists to protect against running twice over.
    pub async fn close(&self) -> Result<()> {
        self.catalog.signal_close();

        let (shards, sfiles): (Vec<_>, Vec<(Database, _)>) = {
            let state = self.catalog.read();
            (
                state.shards.values().cloned().collect(),
                state.sfiles.iter().map(|(db, sfile)| (db.clone(), sfile.clone())).collect(),
            )
        };
        let close_result = lifecycle::close_all(&shards).await;

        let mut sfile_error = None;
        for (database, sfile) in sfiles {
            if let Err(source) = sfile.close().await {
                if sfile_error.is_none() {
                    sfile_error = Some(tsstore_types::Error::SeriesFile { database, source: Box::new(source) });
                }
            }
        }

        {
            let mut state = self.catalog.write();
            state.shards.clear();
            state.sfiles.clear();
            state.epochs.clear();
            state.databases.clear();
            state.pending_shard_deletes.clear();
        }

        if let Some(handle) = self.monitor.lock().expect("monitor handle lock poisoned").take() {
            let _ = handle.await;
        }
        self.catalog.mark_closed();

        close_result.and(sfile_error.map(Err).unwrap_or(Ok(())))
    }

    // ---- LifecycleOps (spec §4.3) ----

    pub async fn create_shard(
        &self,
        opener: &dyn ShardOpener,
        database: Database,
        rp: RetentionPolicy,
        id: ShardId,
        enabled: bool,
    ) -> Result<()> {
        lifecycle::create_shard(&self.catalog, opener, database, rp, id, enabled).await
    }

    pub async fn delete_shard(&self, id: ShardId) -> Result<()> {
        lifecycle::delete_shard(&self.catalog, id).await
    }

    pub async fn delete_retention_policy(&self, database: Database, rp: RetentionPolicy) -> Result<()> {
        lifecycle::delete_retention_policy(&self.catalog, database, rp).await
    }

    pub async fn delete_database(&self, database: Database) -> Result<()> {
        lifecycle::delete_database(&self.catalog, database).await
    }

    pub async fn delete_measurement(&self, database: Database, name: String) -> Result<()> {
        lifecycle::delete_measurement(&self.catalog, database, name).await
    }

    pub async fn delete_series(&self, database: Database, sources: Vec<String>, condition: Option<Expr>) -> Result<()> {
        lifecycle::delete_series(&self.catalog, database, sources, condition).await
    }

    pub async fn write_to_shard(&self, id: ShardId, batch: &dyn WritePreview) -> Result<()> {
        lifecycle::write_to_shard(&self.catalog, id, batch).await
    }

    // ---- CatalogQueries (spec §4.4) ----

    pub async fn measurement_names(
        &self,
        authorizer: &dyn Authorizer,
        database: &Database,
        expr: Option<&Expr>,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<String>>> {
        queries::measurement_names(&self.catalog, authorizer, database, expr, cancel).await
    }

    pub async fn tag_keys(
        &self,
        authorizer: &dyn Authorizer,
        database: &Database,
        shard_ids: &[ShardId],
        cond: Option<&Expr>,
        cancel: &CancellationToken,
    ) -> Result<Vec<MeasurementTagKeys>> {
        queries::tag_keys(&self.catalog, authorizer, database, shard_ids, cond, cancel).await
    }

    pub async fn tag_values(
        &self,
        authorizer: &dyn Authorizer,
        database: &Database,
        shard_ids: &[ShardId],
        cond: &Expr,
        cancel: &CancellationToken,
    ) -> Result<Vec<MeasurementTagValues>> {
        queries::tag_values(&self.catalog, authorizer, database, shard_ids, cond, cancel).await
    }

    pub fn series_cardinality(&self, database: &Database) -> u64 {
        queries::series_cardinality(&self.catalog, database)
    }

    pub fn measurements_cardinality(&self, database: &Database) -> Result<f64> {
        queries::measurements_cardinality(&self.catalog, database)
    }

    // ---- Statistics (spec §4.6) ----

    pub fn shard_statistics(&self, id: ShardId, tags: &[(String, String)]) -> Result<ShardStatistics> {
        stats::shard_statistics(&self.catalog, id, tags)
    }

    pub fn database_statistics(&self, database: &Database) -> Result<DatabaseStatistics> {
        stats::database_statistics(&self.catalog, database)
    }

    // ---- Backup/Restore dispatch (spec §4.7) ----

    pub async fn create_snapshot(&self, id: ShardId, skip_cache_ok: bool) -> Result<PathBuf> {
        backup::create_snapshot(&self.catalog, id, skip_cache_ok).await
    }

    pub async fn backup(&self, id: ShardId, w: &mut (dyn AsyncWrite + Unpin + Send), since: i64) -> Result<()> {
        backup::backup(&self.catalog, id, w, since).await
    }

    pub async fn export(&self, id: ShardId, w: &mut (dyn AsyncWrite + Unpin + Send), start: i64, end: i64) -> Result<()> {
        backup::export(&self.catalog, id, w, start, end).await
    }

    pub async fn restore(&self, id: ShardId, r: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
        backup::restore(&self.catalog, id, r).await
    }

    pub async fn import(&self, id: ShardId, r: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
        backup::import(&self.catalog, id, r).await
    }

    pub async fn digest(&self, id: ShardId) -> Result<Vec<u8>> {
        backup::digest(&self.catalog, id).await
    }

    pub fn is_closing(&self) -> bool {
        self.catalog.is_closing()
    }

    /// Whether `id` currently names a live (non-deleted) shard.
    pub fn has_shard(&self, id: ShardId) -> bool {
        self.catalog.read().shard(id).is_some()
    }

    /// Ids of every shard currently registered under `database`.
    pub fn shard_ids_in_database(&self, database: &Database) -> Vec<ShardId> {
        self.catalog.read().shards_in_database(database).iter().map(|s| s.id()).collect()
    }
}

/// The permissive default authorizer, re-exported for callers that don't
/// need per-measurement authorization.
pub const ALLOW_ALL: AllowAll = AllowAll;
