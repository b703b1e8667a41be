//! Create/delete shard, retention policy, database, measurement, series, and
//! `WriteToShard` — spec §4.3.

use std::sync::Arc;

use tracing::warn;
use tsstore_types::expr::{condition_expr, Expr};
use tsstore_types::{Database, Error, RetentionPolicy, Result, Shard, ShardId, ShardOpener, WritePreview};

use crate::catalog::Catalog;
use crate::epoch::Guard;
use crate::paths;

/// Best-effort close of a shard `create_shard` opened but lost the race to
/// register — logs rather than propagates, since the caller's own result
/// (`Ok(())` / `ShardDeletionInProgress`) is already decided.
async fn close_losing_shard(shard: Arc<dyn Shard>) {
    if let Err(e) = shard.close().await {
        warn!(shard = %shard.id(), error = %e, "failed to close shard that lost the create-shard race");
    }
}

fn remove_dir_all_tolerant(path: &std::path::Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io { path: path.to_path_buf(), source: e }),
    }
}

/// spec §4.3.1.
pub async fn create_shard(
    catalog: &Catalog,
    opener: &dyn ShardOpener,
    database: Database,
    rp: RetentionPolicy,
    id: ShardId,
    enabled: bool,
) -> Result<()> {
    catalog.ensure_open()?;
    {
        let state = catalog.read();
        if state.shard(id).is_some() {
            return Ok(());
        }
        if state.pending_shard_deletes.contains(&id) {
            return Err(Error::ShardDeletionInProgress(id));
        }
    }

    let root = catalog.config().data_root.clone();
    let wal_root = catalog.config().wal_root().to_path_buf();

    let rp_dir = paths::retention_policy_dir(&root, &database, &rp);
    paths::create_dir_0700(&rp_dir)?;
    let shard_path = paths::shard_dir(&root, &database, &rp, id);
    paths::create_dir_0700(&shard_path)?;
    let wal_shard_path = paths::shard_dir(&wal_root, &database, &rp, id);
    paths::create_dir_0700(&wal_shard_path)?;

    let sfile = match catalog.read().series_file(&database) {
        Some(sfile) => sfile,
        None => {
            let sfile_path = paths::series_file_dir(&root, &database);
            let sfile = opener.open_series_file(&database, &sfile_path).await?;
            catalog.write().set_series_file(database.clone(), sfile.clone());
            sfile
        }
    };

    let shard = opener
        .open_shard(
            id,
            &database,
            &rp,
            &shard_path,
            &wal_shard_path,
            sfile,
            enabled,
            catalog.compaction_limiter.clone(),
            catalog.compaction_rate_limiter.clone(),
        )
        .await
        .map_err(|source| Error::ShardOpen { shard: id, source: Box::new(source) })?;

    // Re-check after opening: a concurrent `create_shard`/`delete_shard` may
    // have already claimed `id` while this one was opening off-lock. On that
    // losing path the just-opened shard must still be closed — dropping it
    // silently would leak whatever file handles/WAL state a real engine
    // holds open. The lock is never held across `shard.close().await`.
    enum Outcome {
        Inserted,
        AlreadyExists,
        DeletionInProgress,
    }
    let outcome = {
        let mut state = catalog.write();
        if state.shard(id).is_some() {
            Outcome::AlreadyExists
        } else if state.pending_shard_deletes.contains(&id) {
            Outcome::DeletionInProgress
        } else {
            state.insert_shard(shard.clone());
            Outcome::Inserted
        }
    };
    match outcome {
        Outcome::Inserted => {}
        Outcome::AlreadyExists => {
            close_losing_shard(shard).await;
            return Ok(());
        }
        Outcome::DeletionInProgress => {
            close_losing_shard(shard).await;
            return Err(Error::ShardDeletionInProgress(id));
        }
    }

    if catalog
        .read()
        .database_state(&database)
        .map(|s| s.has_multiple_index_types())
        .unwrap_or(false)
    {
        warn!(database = %database, "database now has shards with multiple index types");
    }

    Ok(())
}

/// spec §4.3.2. Open Question (a): the order is exactly "diff series, close
/// shard, remove path" — preserved as specified, not reordered.
pub async fn delete_shard(catalog: &Catalog, id: ShardId) -> Result<()> {
    catalog.ensure_open()?;
    let (shard, database, index_type, siblings) = {
        let mut state = catalog.write();
        let Some(shard) = state.begin_shard_deletion(id) else {
            return Ok(());
        };
        let database = shard.database().clone();
        let index_type = shard.index_type().to_string();
        let siblings = state.shards_in_database(&database);
        (shard, database, index_type, siblings)
    };

    let result = delete_shard_body(catalog, &shard, &database, &siblings).await;

    // Guaranteed-on-exit: clear the pending marker regardless of outcome.
    catalog.write().finish_shard_deletion(id, &database, &index_type);

    result
}

async fn delete_shard_body(
    catalog: &Catalog,
    shard: &Arc<dyn Shard>,
    database: &Database,
    siblings: &[Arc<dyn Shard>],
) -> Result<()> {
    let mut unique_ids = shard.index().series_id_set();
    for sibling in siblings {
        unique_ids.difference_with(&sibling.index().series_id_set());
    }

    if let Some(sfile) = catalog.read().series_file(database) {
        for series_id in unique_ids.iter() {
            sfile.delete_series_id(series_id)?;
        }
    }

    shard
        .close()
        .await
        .map_err(|source| Error::ShardClose { shard: shard.id(), source: Box::new(source) })?;

    let root = catalog.config().data_root.clone();
    let wal_root = catalog.config().wal_root().to_path_buf();
    let rp = shard.retention_policy().clone();
    remove_dir_all_tolerant(&paths::shard_dir(&root, database, &rp, shard.id()))?;
    remove_dir_all_tolerant(&paths::shard_dir(&wal_root, database, &rp, shard.id()))?;

    Ok(())
}

pub(crate) async fn close_all(shards: &[Arc<dyn Shard>]) -> Result<()> {
    let closes = shards.iter().map(|s| {
        let s = s.clone();
        async move {
            s.close()
                .await
                .map_err(|source| Error::ShardClose { shard: s.id(), source: Box::new(source) })
        }
    });
    let results = futures::future::join_all(closes).await;
    let mut first_error = None;
    for result in results {
        if let Err(e) = result {
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// spec §4.3.3.
pub async fn delete_retention_policy(catalog: &Catalog, database: Database, rp: RetentionPolicy) -> Result<()> {
    catalog.ensure_open()?;
    if catalog.read().database_state(&database).is_none() {
        return Ok(());
    }

    let shards = catalog.read().shards_in_retention_policy(&database, &rp);
    let close_result = close_all(&shards).await;

    let root = catalog.config().data_root.clone();
    let wal_root = catalog.config().wal_root().to_path_buf();
    let data_dir = paths::retention_policy_dir(&root, &database, &rp);
    let wal_dir = paths::retention_policy_dir(&wal_root, &database, &rp);
    let validated_data = paths::validate_depth_below_root(&root, &data_dir, 2)?;
    let validated_wal = paths::validate_depth_below_root(&wal_root, &wal_dir, 2)?;
    remove_dir_all_tolerant(&validated_data)?;
    remove_dir_all_tolerant(&validated_wal)?;

    {
        let mut state = catalog.write();
        for shard in &shards {
            state.shards.remove(&shard.id());
            state.epochs.remove(&shard.id());
            if let Some(db_state) = state.databases.get_mut(&database) {
                db_state.remove_index_type(shard.index_type());
            }
        }
        if state.databases.get(&database).map(|s| s.is_empty()).unwrap_or(false) {
            state.databases.remove(&database);
        }
    }

    close_result
}

/// spec §4.3.4.
pub async fn delete_database(catalog: &Catalog, database: Database) -> Result<()> {
    catalog.ensure_open()?;
    if catalog.read().database_state(&database).is_none() && catalog.read().series_file(&database).is_none() {
        return Ok(());
    }

    let shards = catalog.read().shards_in_database(&database);
    let close_result = close_all(&shards).await;

    let sfile = catalog.write().remove_series_file(&database);
    let sfile_result = match sfile {
        Some(sfile) => sfile
            .close()
            .await
            .map_err(|source| Error::SeriesFile { database: database.clone(), source: Box::new(source) }),
        None => Ok(()),
    };

    let root = catalog.config().data_root.clone();
    let wal_root = catalog.config().wal_root().to_path_buf();
    let data_dir = paths::database_dir(&root, &database);
    let wal_dir = paths::database_dir(&wal_root, &database);
    let validated_data = paths::validate_depth_below_root(&root, &data_dir, 1)?;
    let validated_wal = paths::validate_depth_below_root(&wal_root, &wal_dir, 1)?;
    remove_dir_all_tolerant(&validated_data)?;
    remove_dir_all_tolerant(&validated_wal)?;

    {
        let mut state = catalog.write();
        for shard in &shards {
            state.shards.remove(&shard.id());
            state.epochs.remove(&shard.id());
        }
        state.remove_database(&database);
    }

    close_result.and(sfile_result)
}

/// spec §4.3.5: `DeleteMeasurement`.
pub async fn delete_measurement(catalog: &Catalog, database: Database, name: String) -> Result<()> {
    delete_with_guard(catalog, database, vec![name], None).await
}

/// spec §4.3.5: `DeleteSeries`. `sources` empty means "all measurements".
pub async fn delete_series(
    catalog: &Catalog,
    database: Database,
    sources: Vec<String>,
    condition: Option<Expr>,
) -> Result<()> {
    delete_with_guard(catalog, database, sources, condition).await
}

async fn delete_with_guard(
    catalog: &Catalog,
    database: Database,
    names: Vec<String>,
    condition: Option<Expr>,
) -> Result<()> {
    catalog.ensure_open()?;
    if catalog
        .read()
        .database_state(&database)
        .map(|s| s.has_multiple_index_types())
        .unwrap_or(false)
    {
        return Err(Error::MultipleIndexTypes(database));
    }

    let (filter_expr, time_range) = condition_expr(condition.as_ref());

    let entries = {
        let state = catalog.read();
        state
            .shards_in_database(&database)
            .into_iter()
            .filter_map(|shard| {
                let epoch = state.epoch(shard.id())?;
                Some((shard, epoch))
            })
            .collect::<Vec<_>>()
    };

    let cancel = catalog.closing_token();

    for (shard, epoch) in entries {
        let _permit = catalog.delete_limiter.acquire().await;

        let guard = Guard::new(time_range.min, time_range.max, names.clone(), filter_expr.clone());
        let waiter = epoch.wait_delete(guard);

        let cancel_for_wait = cancel.clone();
        let waiter = tokio::task::spawn_blocking(move || {
            let result = waiter.wait(&cancel_for_wait);
            (waiter, result)
        })
        .await
        .expect("epoch waiter task panicked");
        let (waiter, wait_result) = waiter;
        if let Err(e) = wait_result {
            waiter.done();
            return Err(e);
        }

        let delete_result = if names.is_empty() && filter_expr.is_none() {
            // Whole-database delete with no measurement/condition filter:
            // still operate measurement-by-measurement since `Shard` exposes
            // no "delete everything" primitive other than per-measurement.
            delete_all_measurements(shard.as_ref()).await
        } else if filter_expr.is_none() {
            delete_named_measurements(shard.as_ref(), &names).await
        } else {
            delete_by_series_range(shard.as_ref(), &names, filter_expr.as_ref(), time_range.min, time_range.max).await
        };

        waiter.done();
        delete_result?;
    }

    Ok(())
}

async fn delete_all_measurements(shard: &dyn Shard) -> Result<()> {
    for name in shard.index().measurement_names() {
        shard.delete_measurement(&name).await?;
    }
    Ok(())
}

async fn delete_named_measurements(shard: &dyn Shard, names: &[String]) -> Result<()> {
    for name in names {
        shard.delete_measurement(name).await?;
    }
    Ok(())
}

async fn delete_by_series_range(
    shard: &dyn Shard,
    names: &[String],
    filter_expr: Option<&Expr>,
    min_time: i64,
    max_time: i64,
) -> Result<()> {
    let index = shard.index();
    let measurement_names = if names.is_empty() { index.measurement_names() } else { names.to_vec() };
    for name in measurement_names {
        let ids = index.measurement_series_by_expr_ids(&name, filter_expr)?;
        if !ids.is_empty() {
            shard.delete_series_range(&ids, min_time, max_time).await?;
        }
    }
    Ok(())
}

/// spec §4.3.6.
pub async fn write_to_shard(catalog: &Catalog, id: ShardId, batch: &dyn WritePreview) -> Result<()> {
    catalog.ensure_open()?;
    let (shard, epoch) = {
        let state = catalog.read();
        let shard = state.shard(id).ok_or(Error::ShardNotFound(id))?;
        let epoch = state.epoch(id).expect("every live shard has an epoch tracker");
        (shard, epoch)
    };

    let (guards, generation) = epoch.start_write();
    let matching: Vec<u64> = guards
        .iter()
        .filter(|(_, guard)| guard.matches(batch))
        .map(|(guard_id, _)| *guard_id)
        .collect();

    let cancel = catalog.closing_token();
    for guard_id in matching {
        let epoch = epoch.clone();
        let cancel = cancel.clone();
        let result = tokio::task::spawn_blocking(move || epoch.wait_for_guard(guard_id, &cancel))
            .await
            .expect("guard wait task panicked");
        if let Err(e) = result {
            epoch.end_write(generation);
            return Err(e);
        }
    }

    if shard.is_idle() {
        shard.set_compactions_enabled(true);
    }

    let write_result = shard.write_points(batch).await;
    epoch.end_write(generation);
    write_result
}
