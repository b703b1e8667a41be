//! The [`Catalog`] — authoritative in-memory state behind a single
//! multi-reader/single-writer lock (spec §3, §5).
//!
//! `std::sync::RwLock` rather than `tokio::sync::RwLock`: spec §5 forbids
//! holding the catalog lock across blocking I/O or an `.await`, and a
//! synchronous guard makes that a compile-time property (it is not `Send`
//! across an await point once held) instead of a discipline callers must
//! remember. Every operation that touches disk or a shard follows the
//! snapshot pattern: acquire, copy out what's needed, release, then act.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio_util::sync::CancellationToken;
use tsstore_types::{Database, Error, Limiter, RateLimiter, RetentionPolicy, Result, SeriesFile, Shard, ShardId, StoreConfig};

use crate::database_state::DatabaseState;
use crate::epoch::EpochTracker;

/// Everything protected by the catalog lock.
pub struct CatalogState {
    pub(crate) shards: HashMap<ShardId, Arc<dyn Shard>>,
    pub(crate) sfiles: HashMap<Database, Arc<dyn SeriesFile>>,
    pub(crate) databases: HashMap<Database, DatabaseState>,
    pub(crate) pending_shard_deletes: HashSet<ShardId>,
    pub(crate) epochs: HashMap<ShardId, Arc<EpochTracker>>,
    pub(crate) opened: bool,
}

impl CatalogState {
    fn new() -> Self {
        Self {
            shards: HashMap::new(),
            sfiles: HashMap::new(),
            databases: HashMap::new(),
            pending_shard_deletes: HashSet::new(),
            epochs: HashMap::new(),
            opened: false,
        }
    }

    pub fn shard(&self, id: ShardId) -> Option<Arc<dyn Shard>> {
        self.shards.get(&id).cloned()
    }

    pub fn epoch(&self, id: ShardId) -> Option<Arc<EpochTracker>> {
        self.epochs.get(&id).cloned()
    }

    pub fn series_file(&self, database: &Database) -> Option<Arc<dyn SeriesFile>> {
        self.sfiles.get(database).cloned()
    }

    pub fn database_state(&self, database: &Database) -> Option<&DatabaseState> {
        self.databases.get(database)
    }

    pub fn shards_in_database(&self, database: &Database) -> Vec<Arc<dyn Shard>> {
        self.shards
            .values()
            .filter(|s| s.database() == database)
            .cloned()
            .collect()
    }

    pub fn shards_in_retention_policy(&self, database: &Database, rp: &RetentionPolicy) -> Vec<Arc<dyn Shard>> {
        self.shards
            .values()
            .filter(|s| s.database() == database && s.retention_policy() == rp)
            .cloned()
            .collect()
    }

    pub fn shards_by_id(&self, ids: &[ShardId]) -> Vec<Arc<dyn Shard>> {
        ids.iter().filter_map(|id| self.shard(*id)).collect()
    }

    /// Registers a freshly opened shard and its epoch tracker. Caller must
    /// have already verified the id is free and not pending deletion
    /// (invariant 2/3 of spec §3).
    pub fn insert_shard(&mut self, shard: Arc<dyn Shard>) {
        let id = shard.id();
        let database = shard.database().clone();
        let index_type = shard.index_type().to_string();
        self.shards.insert(id, shard);
        self.epochs.insert(id, Arc::new(EpochTracker::new()));
        self.databases
            .entry(database)
            .or_insert_with(DatabaseState::new)
            .add_index_type(&index_type);
    }

    /// Moves `id` from `shards` into `pending_shard_deletes`, returning the
    /// removed shard so the caller can snapshot it before releasing the lock
    /// (spec §4.3.2 step 1).
    pub fn begin_shard_deletion(&mut self, id: ShardId) -> Option<Arc<dyn Shard>> {
        let shard = self.shards.remove(&id)?;
        self.epochs.remove(&id);
        self.pending_shard_deletes.insert(id);
        Some(shard)
    }

    /// Finalizes a shard deletion begun by `begin_shard_deletion`: clears the
    /// pending marker and decrements the database's index-type count.
    /// Idempotent-safe to call even on a partially-failed deletion, per the
    /// "guaranteed-on-exit" requirement of spec §4.3.2.
    pub fn finish_shard_deletion(&mut self, id: ShardId, database: &Database, index_type: &str) {
        self.pending_shard_deletes.remove(&id);
        if let Some(state) = self.databases.get_mut(database) {
            state.remove_index_type(index_type);
            if state.is_empty() {
                self.databases.remove(database);
            }
        }
    }

    pub fn set_series_file(&mut self, database: Database, sfile: Arc<dyn SeriesFile>) {
        self.sfiles.insert(database, sfile);
    }

    pub fn remove_series_file(&mut self, database: &Database) -> Option<Arc<dyn SeriesFile>> {
        self.sfiles.remove(database)
    }

    pub fn remove_database(&mut self, database: &Database) {
        self.databases.remove(database);
    }

    pub fn databases_with_mixed_index_types(&self) -> Vec<Database> {
        self.databases
            .iter()
            .filter(|(_, state)| state.has_multiple_index_types())
            .map(|(db, _)| db.clone())
            .collect()
    }
}

/// The Store's process-wide catalog: shard/series-file/database maps behind
/// one lock, plus the shared bounded-concurrency primitives spec §5 names.
pub struct Catalog {
    config: StoreConfig,
    state: RwLock<CatalogState>,
    closing: CancellationToken,
    pub open_limiter: Limiter,
    /// Shared across shard construction calls so a concrete storage engine
    /// can bound its own compaction concurrency against the rest of the
    /// catalog's shards (spec §2/§5) — see `ShardOpener::open_shard`.
    pub compaction_limiter: Limiter,
    pub compaction_rate_limiter: Arc<RateLimiter>,
    /// Width-1 limiter bounding `DeleteMeasurement`/`DeleteSeries` concurrency
    /// across shards (spec §4.3.5, §5: "not a performance bug, a memory bound").
    pub delete_limiter: Limiter,
}

impl Catalog {
    pub fn new(config: StoreConfig) -> Self {
        let open_limiter = Limiter::new(config.open_limiter_width);
        let compaction_limiter = Limiter::new(config.compaction_limiter_width);
        let compaction_rate_limiter = Arc::new(match config.compaction_throughput_bytes_per_sec {
            Some(bytes_per_sec) => RateLimiter::new(bytes_per_sec, config.compaction_throughput_burst_bytes),
            None => RateLimiter::unlimited(),
        });
        Self {
            config,
            state: RwLock::new(CatalogState::new()),
            closing: CancellationToken::new(),
            open_limiter,
            compaction_limiter,
            compaction_rate_limiter,
            delete_limiter: Limiter::new(1),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn closing_token(&self) -> CancellationToken {
        self.closing.clone()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.is_cancelled()
    }

    pub fn signal_close(&self) {
        self.closing.cancel();
    }

    pub fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().expect("catalog lock poisoned")
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().expect("catalog lock poisoned")
    }

    pub fn is_opened(&self) -> bool {
        self.read().opened
    }

    pub fn mark_opened(&self) {
        self.write().opened = true;
    }

    pub fn mark_closed(&self) {
        self.write().opened = false;
    }

    /// Fails fast with `Error::StoreClosed` if the catalog has been closed or
    /// never opened. Every public lifecycle/query/write entry point starts
    /// with this check under the read lock (spec §4.3.6, §6.6).
    pub fn ensure_open(&self) -> Result<()> {
        if self.is_closing() || !self.is_opened() {
            return Err(Error::StoreClosed);
        }
        Ok(())
    }
}
