//! Store configuration knobs.
//!
//! Grounded on `aerolithdb-core::config::AerolithsConfig`'s per-subsystem
//! composition pattern (a `serde`-serializable struct with a sane `Default`),
//! trimmed to only what this Store needs: limiter widths, the monitor's
//! enable flag/interval, and the optional database/retention-policy/shard
//! filters `Loader` consults at startup. The teacher's network/security/
//! consensus/API sections have no counterpart in this crate's scope.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, serde::Serialize, serde::Deserialize)]
pub struct StoreConfig {
    /// `<root>/<db>/<rp>/<shard>` tree.
    pub data_root: PathBuf,
    /// `<wal_root>/<db>/<rp>/<shard>` tree; defaults to `data_root` if unset.
    pub wal_root: Option<PathBuf>,

    /// Width of the shard-open limiter. Defaults to the number of CPUs.
    pub open_limiter_width: usize,
    /// Width of the compaction limiter. Defaults to `max(1, cpus/2)` capped at `cpus`.
    pub compaction_limiter_width: usize,
    /// Compaction byte-rate limit; `None` is unlimited.
    pub compaction_throughput_bytes_per_sec: Option<u64>,
    /// Burst allowance for the compaction throughput limiter.
    pub compaction_throughput_burst_bytes: u64,

    /// Whether the idle-shard `Monitor` background loop runs at all.
    pub monitor_enabled: bool,
    /// How often `Monitor` sweeps the shard set.
    pub monitor_interval: Duration,

    /// Optional database name filter consulted by `Loader`. Not serializable —
    /// a config file can't carry a closure, so this is always `None` after a
    /// round trip through `serde`; callers that need one set it after loading.
    #[allow(clippy::type_complexity)]
    #[serde(skip)]
    pub database_filter: Option<std::sync::Arc<dyn Fn(&str) -> bool + Send + Sync>>,
    /// Optional retention-policy name filter consulted by `Loader`. Same
    /// `serde(skip)` caveat as `database_filter`.
    #[allow(clippy::type_complexity)]
    #[serde(skip)]
    pub retention_policy_filter: Option<std::sync::Arc<dyn Fn(&str) -> bool + Send + Sync>>,
    /// Optional shard-id filter consulted by `Loader`. Same `serde(skip)`
    /// caveat as `database_filter`.
    #[allow(clippy::type_complexity)]
    #[serde(skip)]
    pub shard_filter: Option<std::sync::Arc<dyn Fn(u64) -> bool + Send + Sync>>,
}

impl StoreConfig {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        let cpus = num_cpus::get();
        Self {
            data_root: data_root.into(),
            wal_root: None,
            open_limiter_width: cpus.max(1),
            compaction_limiter_width: crate::limiter::default_compaction_limiter_width(cpus),
            compaction_throughput_bytes_per_sec: None,
            compaction_throughput_burst_bytes: 16 * 1024 * 1024,
            monitor_enabled: true,
            monitor_interval: Duration::from_secs(10),
            database_filter: None,
            retention_policy_filter: None,
            shard_filter: None,
        }
    }

    pub fn wal_root(&self) -> &std::path::Path {
        self.wal_root.as_deref().unwrap_or(&self.data_root)
    }
}

impl Default for StoreConfig {
    /// Defaults `data_root` to `./data`, matching the root binary's own
    /// `--root` default. Callers that need a different root still go through
    /// [`StoreConfig::new`].
    fn default() -> Self {
        Self::new("./data")
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("data_root", &self.data_root)
            .field("wal_root", &self.wal_root)
            .field("open_limiter_width", &self.open_limiter_width)
            .field("compaction_limiter_width", &self.compaction_limiter_width)
            .field(
                "compaction_throughput_bytes_per_sec",
                &self.compaction_throughput_bytes_per_sec,
            )
            .field("monitor_enabled", &self.monitor_enabled)
            .field("monitor_interval", &self.monitor_interval)
            .finish_non_exhaustive()
    }
}
