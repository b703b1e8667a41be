//! [`load`] — populates the catalog from `<root>/` at startup (spec §4.2).

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};
use tsstore_types::{Database, Error, RetentionPolicy, Result, Shard, ShardId, ShardOpener};

use crate::catalog::Catalog;
use crate::paths::{self, SERIES_DIR};

fn read_dir_entries(path: &std::path::Path) -> Result<Vec<std::fs::DirEntry>> {
    let read_dir = match std::fs::read_dir(path) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::Io { path: path.to_path_buf(), source: e }),
    };
    read_dir
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Io { path: path.to_path_buf(), source: e })
}

/// Walks `catalog.config().data_root`, opening every shard it finds bounded
/// by `catalog.open_limiter`, then enables every successfully loaded shard
/// and frees any that report idle.
pub async fn load(catalog: &Catalog, opener: Arc<dyn ShardOpener>) -> Result<()> {
    let root = catalog.config().data_root.clone();
    let wal_root = catalog.config().wal_root().to_path_buf();

    let mut join_set: JoinSet<(ShardId, Result<Arc<dyn Shard>>)> = JoinSet::new();

    for db_entry in read_dir_entries(&root)? {
        let db_path = db_entry.path();
        if !db_path.is_dir() {
            // Spec §8 boundary: a file at the database level is ignored.
            continue;
        }
        let db_name = db_entry.file_name().to_string_lossy().into_owned();
        if let Some(filter) = &catalog.config().database_filter {
            if !filter(&db_name) {
                continue;
            }
        }
        let database = Database::from(db_name);

        let sfile_path = paths::series_file_dir(&root, &database);
        let sfile = opener.open_series_file(&database, &sfile_path).await?;
        catalog.write().set_series_file(database.clone(), sfile.clone());

        for rp_entry in read_dir_entries(&db_path)? {
            let rp_path = rp_entry.path();
            if !rp_path.is_dir() {
                continue;
            }
            let rp_name = rp_entry.file_name().to_string_lossy().into_owned();
            if rp_name == SERIES_DIR {
                continue;
            }
            if let Some(filter) = &catalog.config().retention_policy_filter {
                if !filter(&rp_name) {
                    continue;
                }
            }
            let retention_policy = RetentionPolicy::from(rp_name);

            for shard_entry in read_dir_entries(&rp_path)? {
                let shard_path = shard_entry.path();
                if !shard_path.is_dir() {
                    continue;
                }
                let name = shard_entry.file_name().to_string_lossy().into_owned();
                let id = match name.parse::<u64>() {
                    Ok(id) => id,
                    Err(_) => {
                        warn!(database = %database, retention_policy = %retention_policy, dir = %name, "non-numeric shard directory, skipping");
                        continue;
                    }
                };
                if let Some(filter) = &catalog.config().shard_filter {
                    if !filter(id) {
                        continue;
                    }
                }
                let shard_id = ShardId(id);
                let wal_path = paths::shard_dir(&wal_root, &database, &retention_policy, shard_id);

                let limiter = catalog.open_limiter.clone();
                let compaction_limiter = catalog.compaction_limiter.clone();
                let compaction_rate_limiter = catalog.compaction_rate_limiter.clone();
                let opener = opener.clone();
                let database = database.clone();
                let retention_policy = retention_policy.clone();
                let sfile = sfile.clone();
                join_set.spawn(async move {
                    let _permit = limiter.acquire().await;
                    let result = opener
                        .open_shard(
                            shard_id,
                            &database,
                            &retention_policy,
                            &shard_path,
                            &wal_path,
                            sfile,
                            false,
                            compaction_limiter,
                            compaction_rate_limiter,
                        )
                        .await
                        .map_err(|source| Error::ShardOpen { shard: shard_id, source: Box::new(source) });
                    (shard_id, result)
                });
            }
        }
    }

    let mut first_error = None;
    let mut loaded = 0usize;
    while let Some(joined) = join_set.join_next().await {
        let (shard_id, result) = joined.expect("shard-open worker panicked");
        match result {
            Ok(shard) => {
                catalog.write().insert_shard(shard);
                loaded += 1;
            }
            Err(e) => {
                warn!(shard = %shard_id, error = %e, "shard failed to open");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    for db in catalog.read().databases_with_mixed_index_types() {
        warn!(database = %db, "database has shards with more than one index type");
    }

    let shards: Vec<Arc<dyn Shard>> = catalog.read().shards.values().cloned().collect();
    for shard in &shards {
        shard.set_enabled(true);
        if shard.is_idle() {
            shard.free()?;
        }
    }

    info!(shards = loaded, "catalog load complete");
    catalog.mark_opened();

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
