//! In-memory `Shard`/`Index`/`SeriesFile` test doubles.
//!
//! Not part of the public interface surface — enabled only under `cfg(test)`
//! or the `test-util` feature — but shipped from this crate rather than
//! duplicated in every `tsstore-core` test module, the way the teacher repo's
//! own integration tests build small self-contained fakes
//! (`tests/minimal_battle_test.rs`'s `MockNode`) instead of standing up the
//! real distributed stack.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::bitset::SeriesIdSet;
use crate::error::Result;
use crate::expr::{BinaryOp, Expr, Literal};
use crate::ids::{Database, RetentionPolicy, ShardId};
use crate::index::Index;
use crate::opener::ShardOpener;
use crate::seriesfile::SeriesFile;
use crate::shard::{Shard, SketchPair, WritePreview};
use crate::sketch::Sketch;
use crate::stats::ShardStatistics;

/// A single in-memory point: a measurement, its tag set, and a timestamp.
#[derive(Debug, Clone)]
pub struct TestPoint {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub time: i64,
}

impl TestPoint {
    pub fn new(measurement: &str, tags: &[(&str, &str)], time: i64) -> Self {
        Self {
            measurement: measurement.to_string(),
            tags: tags.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            time,
        }
    }

    /// A series key uniquely identifying `(measurement, tag set)`.
    fn series_key(&self) -> String {
        let mut key = self.measurement.clone();
        for (k, v) in &self.tags {
            key.push(',');
            key.push_str(k);
            key.push('=');
            key.push_str(v);
        }
        key
    }
}

/// A batch of [`TestPoint`]s, implementing [`WritePreview`] for epoch-guard
/// matching.
pub struct TestBatch {
    pub points: Vec<TestPoint>,
    measurement_names: Vec<String>,
}

impl TestBatch {
    pub fn new(points: Vec<TestPoint>) -> Self {
        let mut names: Vec<String> = points.iter().map(|p| p.measurement.clone()).collect();
        names.sort();
        names.dedup();
        Self {
            points,
            measurement_names: names,
        }
    }
}

impl WritePreview for TestBatch {
    fn min_time(&self) -> i64 {
        self.points.iter().map(|p| p.time).min().unwrap_or(i64::MIN)
    }

    fn max_time(&self) -> i64 {
        self.points.iter().map(|p| p.time).max().unwrap_or(i64::MAX)
    }

    fn measurement_names(&self) -> &[String] {
        &self.measurement_names
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[derive(Default)]
struct IndexState {
    /// measurement -> series ids
    measurements: BTreeMap<String, BTreeSet<u64>>,
    /// series id -> (measurement, tags)
    series: BTreeMap<u64, (String, BTreeMap<String, String>)>,
}

pub struct InMemoryIndex {
    state: RwLock<IndexState>,
    index_type: String,
}

impl InMemoryIndex {
    pub fn new(index_type: &str) -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
            index_type: index_type.to_string(),
        }
    }

    fn insert_series(&self, id: u64, measurement: &str, tags: &BTreeMap<String, String>) {
        let mut state = self.state.write();
        state
            .measurements
            .entry(measurement.to_string())
            .or_default()
            .insert(id);
        state.series.insert(id, (measurement.to_string(), tags.clone()));
    }

    fn remove_measurement(&self, name: &str) -> Vec<u64> {
        let mut state = self.state.write();
        let ids: Vec<u64> = state.measurements.remove(name).into_iter().flatten().collect();
        for id in &ids {
            state.series.remove(id);
        }
        ids
    }
}

fn eval_expr(expr: &Expr, tags: &BTreeMap<String, String>) -> bool {
    match expr {
        Expr::And(lhs, rhs) => eval_expr(lhs, tags) && eval_expr(rhs, tags),
        Expr::Or(lhs, rhs) => eval_expr(lhs, tags) || eval_expr(rhs, tags),
        Expr::Paren(inner) => eval_expr(inner, tags),
        Expr::BinaryExpr { lhs, op, rhs } => {
            let (Expr::Reference(key), Expr::Literal(Literal::Str(value))) = (lhs.as_ref(), rhs.as_ref()) else {
                return true;
            };
            let actual = tags.get(key).map(|s| s.as_str());
            match op {
                BinaryOp::Eq => actual == Some(value.as_str()),
                BinaryOp::NotEq => actual != Some(value.as_str()),
                _ => true,
            }
        }
        _ => true,
    }
}

impl Index for InMemoryIndex {
    fn series_id_set(&self) -> SeriesIdSet {
        self.state.read().series.keys().copied().collect()
    }

    fn measurement_names(&self) -> Vec<String> {
        self.state.read().measurements.keys().cloned().collect()
    }

    fn measurement_series_ids(&self, name: &str) -> SeriesIdSet {
        self.state
            .read()
            .measurements
            .get(name)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn measurement_series_by_expr_ids(&self, name: &str, expr: Option<&Expr>) -> Result<SeriesIdSet> {
        let state = self.state.read();
        let Some(ids) = state.measurements.get(name) else {
            return Ok(SeriesIdSet::new());
        };
        let mut out = SeriesIdSet::new();
        for id in ids {
            let matches = match expr {
                None => true,
                Some(expr) => state
                    .series
                    .get(id)
                    .map(|(_, tags)| eval_expr(expr, tags))
                    .unwrap_or(false),
            };
            if matches {
                out.insert(*id);
            }
        }
        Ok(out)
    }

    fn measurement_tag_keys(&self, name: &str) -> Vec<String> {
        let state = self.state.read();
        let mut keys = BTreeSet::new();
        if let Some(ids) = state.measurements.get(name) {
            for id in ids {
                if let Some((_, tags)) = state.series.get(id) {
                    keys.extend(tags.keys().cloned());
                }
            }
        }
        keys.into_iter().collect()
    }

    fn measurement_tag_key_values(&self, name: &str, key: &str) -> Vec<String> {
        let state = self.state.read();
        let mut values = BTreeSet::new();
        if let Some(ids) = state.measurements.get(name) {
            for id in ids {
                if let Some((_, tags)) = state.series.get(id) {
                    if let Some(v) = tags.get(key) {
                        values.insert(v.clone());
                    }
                }
            }
        }
        values.into_iter().collect()
    }
}

#[derive(Default)]
pub struct InMemorySeriesFile {
    next_id: AtomicU64,
    by_key: RwLock<BTreeMap<String, u64>>,
    by_id: RwLock<BTreeMap<u64, String>>,
}

impl InMemorySeriesFile {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1),
            by_key: RwLock::new(BTreeMap::new()),
            by_id: RwLock::new(BTreeMap::new()),
        })
    }

    /// Returns the id for `key`, allocating a new one if unseen. Shared by
    /// every shard of a database, matching spec §3's "SeriesFile ... Owns a
    /// monotonic series-ID catalog for the database; multiple shards share it."
    pub fn id_for_key(&self, key: &str) -> u64 {
        if let Some(id) = self.by_key.read().get(key) {
            return *id;
        }
        let mut by_key = self.by_key.write();
        if let Some(id) = by_key.get(key) {
            return *id;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        by_key.insert(key.to_string(), id);
        self.by_id.write().insert(id, key.to_string());
        id
    }

    pub fn series_n(&self) -> i64 {
        self.by_id.read().len() as i64
    }
}

#[async_trait]
impl SeriesFile for InMemorySeriesFile {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn with_max_compaction_concurrency(&self, _n: usize) {}

    fn delete_series_id(&self, id: u64) -> Result<()> {
        if let Some(key) = self.by_id.write().remove(&id) {
            self.by_key.write().remove(&key);
        }
        Ok(())
    }
}

pub struct InMemoryShard {
    id: ShardId,
    database: Database,
    retention_policy: RetentionPolicy,
    path: PathBuf,
    wal_path: PathBuf,
    index_type: String,
    enabled: AtomicBool,
    compactions_enabled: AtomicBool,
    idle: AtomicBool,
    index: Arc<InMemoryIndex>,
    series_file: Arc<InMemorySeriesFile>,
    points: RwLock<Vec<(u64, i64)>>, // (series_id, time)
}

impl InMemoryShard {
    pub fn new(
        id: ShardId,
        database: Database,
        retention_policy: RetentionPolicy,
        path: PathBuf,
        wal_path: PathBuf,
        index_type: &str,
        series_file: Arc<InMemorySeriesFile>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            database,
            retention_policy,
            path,
            wal_path,
            index_type: index_type.to_string(),
            enabled: AtomicBool::new(false),
            compactions_enabled: AtomicBool::new(true),
            idle: AtomicBool::new(false),
            index: Arc::new(InMemoryIndex::new(index_type)),
            series_file,
            points: RwLock::new(Vec::new()),
        })
    }

    /// Test helper: force `is_idle()` to return `true`/`false`.
    pub fn set_idle_for_test(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn are_compactions_enabled(&self) -> bool {
        self.compactions_enabled.load(Ordering::SeqCst)
    }

    fn write_test_points(&self, points: &[TestPoint]) {
        let mut stored = self.points.write();
        for point in points {
            let key = point.series_key();
            let id = self.series_file.id_for_key(&key);
            self.index.insert_series(id, &point.measurement, &point.tags);
            stored.push((id, point.time));
        }
    }
}

#[async_trait]
impl Shard for InMemoryShard {
    fn id(&self) -> ShardId {
        self.id
    }

    fn database(&self) -> &Database {
        &self.database
    }

    fn retention_policy(&self) -> &RetentionPolicy {
        &self.retention_policy
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    fn index_type(&self) -> &str {
        &self.index_type
    }

    async fn open(&self, enabled: bool) -> Result<()> {
        self.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.enabled.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    fn set_compactions_enabled(&self, enabled: bool) {
        self.compactions_enabled.store(enabled, Ordering::SeqCst);
    }

    fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    fn free(&self) -> Result<()> {
        Ok(())
    }

    async fn write_points(&self, points: &dyn WritePreview) -> Result<()> {
        // `WritePreview` doesn't carry the raw points for real shards (only a
        // preview); the in-memory test double downcasts to `TestBatch`
        // because it *is* both the shard and the only writer in tests.
        if let Some(batch) = points.as_any().downcast_ref::<TestBatch>() {
            self.write_test_points(&batch.points);
        }
        Ok(())
    }

    async fn delete_measurement(&self, name: &str) -> Result<()> {
        let ids = self.index.remove_measurement(name);
        let ids: BTreeSet<u64> = ids.into_iter().collect();
        self.points.write().retain(|(id, _)| !ids.contains(id));
        Ok(())
    }

    async fn delete_series_range(&self, series_ids: &SeriesIdSet, min_time: i64, max_time: i64) -> Result<()> {
        self.points
            .write()
            .retain(|(id, time)| !(series_ids.contains(*id) && *time >= min_time && *time <= max_time));
        Ok(())
    }

    fn index(&self) -> Arc<dyn Index> {
        self.index.clone()
    }

    fn series_file(&self) -> Arc<dyn SeriesFile> {
        self.series_file.clone()
    }

    fn series_n(&self) -> i64 {
        self.index.series_id_set().len() as i64
    }

    fn statistics(&self, tags: &[(String, String)]) -> ShardStatistics {
        let mut stats = ShardStatistics::new(&self.database, &self.retention_policy, self.id);
        stats.series_n = self.series_n();
        stats.disk_size_bytes = self.disk_size();
        stats.tags = tags.to_vec();
        stats
    }

    fn disk_size(&self) -> u64 {
        (self.points.read().len() * 16) as u64
    }

    fn series_sketches(&self) -> Result<SketchPair> {
        let mut items = Sketch::new();
        for id in self.index.series_id_set().iter() {
            items.insert(id);
        }
        Ok(SketchPair { items, tombstones: Sketch::new() })
    }

    fn measurements_sketches(&self) -> Result<SketchPair> {
        let mut items = Sketch::new();
        for name in self.index.measurement_names() {
            items.insert_hashable(&name);
        }
        Ok(SketchPair { items, tombstones: Sketch::new() })
    }

    async fn create_snapshot(&self, _skip_cache_ok: bool) -> Result<PathBuf> {
        Ok(self.path.join("snapshot"))
    }

    async fn backup(&self, w: &mut (dyn AsyncWrite + Unpin + Send), since: i64) -> Result<()> {
        let points = self.points.read();
        let payload: Vec<u8> = points
            .iter()
            .filter(|(_, t)| *t >= since)
            .flat_map(|(id, t)| [id.to_le_bytes(), t.to_le_bytes()].concat())
            .collect();
        w.write_all(&payload).await.map_err(|e| crate::error::Error::Io {
            path: self.path.clone(),
            source: e,
        })
    }

    async fn export(&self, w: &mut (dyn AsyncWrite + Unpin + Send), start: i64, end: i64) -> Result<()> {
        let points = self.points.read();
        let payload: Vec<u8> = points
            .iter()
            .filter(|(_, t)| *t >= start && *t <= end)
            .flat_map(|(id, t)| [id.to_le_bytes(), t.to_le_bytes()].concat())
            .collect();
        w.write_all(&payload).await.map_err(|e| crate::error::Error::Io {
            path: self.path.clone(),
            source: e,
        })
    }

    async fn restore(&self, r: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).await.map_err(|e| crate::error::Error::Io {
            path: self.path.clone(),
            source: e,
        })?;
        let mut points = self.points.write();
        for chunk in buf.chunks_exact(16) {
            let id = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
            let t = i64::from_le_bytes(chunk[8..16].try_into().unwrap());
            points.push((id, t));
        }
        Ok(())
    }

    async fn import(&self, r: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
        self.restore(r).await
    }

    async fn digest(&self) -> Result<Vec<u8>> {
        Ok(self.points.read().len().to_le_bytes().to_vec())
    }
}

/// An in-memory [`ShardOpener`]: constructs [`InMemoryShard`]s and shares one
/// [`InMemorySeriesFile`] per database, exactly as spec §3 requires
/// ("multiple shards share it").
#[derive(Default)]
pub struct InMemoryOpener {
    series_files: RwLock<BTreeMap<Database, Arc<InMemorySeriesFile>>>,
    index_type: String,
}

impl InMemoryOpener {
    pub fn new(index_type: &str) -> Arc<Self> {
        Arc::new(Self {
            series_files: RwLock::new(BTreeMap::new()),
            index_type: index_type.to_string(),
        })
    }
}

#[async_trait]
impl ShardOpener for InMemoryOpener {
    async fn open_series_file(&self, database: &Database, _path: &Path) -> Result<Arc<dyn SeriesFile>> {
        let sfile = {
            let mut files = self.series_files.write();
            files.entry(database.clone()).or_insert_with(InMemorySeriesFile::new).clone()
        };
        sfile.open().await?;
        Ok(sfile)
    }

    async fn open_shard(
        &self,
        id: ShardId,
        database: &Database,
        rp: &RetentionPolicy,
        path: &Path,
        wal_path: &Path,
        _sfile: Arc<dyn SeriesFile>,
        enabled: bool,
        _compaction_limiter: crate::limiter::Limiter,
        _compaction_rate_limiter: Arc<crate::limiter::RateLimiter>,
    ) -> Result<Arc<dyn Shard>> {
        let sfile = self
            .series_files
            .read()
            .get(database)
            .cloned()
            .expect("open_series_file must be called before open_shard");
        let shard = InMemoryShard::new(
            id,
            database.clone(),
            rp.clone(),
            path.to_path_buf(),
            wal_path.to_path_buf(),
            &self.index_type,
            sfile,
        );
        shard.open(enabled).await?;
        Ok(shard)
    }
}
