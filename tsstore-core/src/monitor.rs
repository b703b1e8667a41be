//! Idle-shard monitor — spec §4.5.
//!
//! A background sweep, the same shape as the teacher's tiered-cache eviction
//! loop (`aerolithdb-cache`'s periodic TTL sweep over `tokio::time::interval`),
//! generalized here from evicting cache entries to freeing idle shards.

use std::sync::Arc;

use tracing::debug;

use crate::catalog::Catalog;

/// Runs until `catalog.closing_token()` fires. Callers must not spawn this at
/// all when `catalog.config().monitor_enabled` is false (spec §4.5: disabled
/// entirely, never spawned) — this function assumes it's already enabled.
pub async fn run(catalog: Arc<Catalog>) {
    let mut ticker = tokio::time::interval(catalog.config().monitor_interval);
    let cancel = catalog.closing_token();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => sweep(&catalog),
        }
    }
}

/// For each shard: `Free` it if idle, otherwise re-enable its compactions —
/// spec §4.5. Taken under the read lock, matching the snapshot pattern
/// (§5): `Shard::free`/`set_compactions_enabled` are shard-local calls, not
/// catalog mutations, so holding the read lock for the sweep is sufficient.
fn sweep(catalog: &Catalog) {
    let shards: Vec<_> = catalog.read().shards.values().cloned().collect();
    let mut freed = 0usize;
    for shard in shards {
        if shard.is_idle() {
            match shard.free() {
                Ok(()) => freed += 1,
                Err(e) => debug!(shard = %shard.id(), error = %e, "failed to free idle shard"),
            }
        } else {
            shard.set_compactions_enabled(true);
        }
    }
    if freed > 0 {
        debug!(freed, "idle-shard sweep freed resources");
    }
}
