//! Backup/restore/export/import/digest/snapshot — thin forwarders to the
//! shard's own methods (spec §4.7: "~2%, thin forwarders").

use tokio::io::{AsyncRead, AsyncWrite};

use tsstore_types::{Error, Result, ShardId};

use crate::catalog::Catalog;

fn lookup(catalog: &Catalog, id: ShardId) -> Result<std::sync::Arc<dyn tsstore_types::Shard>> {
    catalog.ensure_open()?;
    catalog.read().shard(id).ok_or(Error::ShardNotFound(id))
}

pub async fn create_snapshot(catalog: &Catalog, id: ShardId, skip_cache_ok: bool) -> Result<std::path::PathBuf> {
    lookup(catalog, id)?.create_snapshot(skip_cache_ok).await
}

pub async fn backup(catalog: &Catalog, id: ShardId, w: &mut (dyn AsyncWrite + Unpin + Send), since: i64) -> Result<()> {
    lookup(catalog, id)?.backup(w, since).await
}

pub async fn export(
    catalog: &Catalog,
    id: ShardId,
    w: &mut (dyn AsyncWrite + Unpin + Send),
    start: i64,
    end: i64,
) -> Result<()> {
    lookup(catalog, id)?.export(w, start, end).await
}

pub async fn restore(catalog: &Catalog, id: ShardId, r: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
    lookup(catalog, id)?.restore(r).await
}

pub async fn import(catalog: &Catalog, id: ShardId, r: &mut (dyn AsyncRead + Unpin + Send)) -> Result<()> {
    lookup(catalog, id)?.import(r).await
}

pub async fn digest(catalog: &Catalog, id: ShardId) -> Result<Vec<u8>> {
    lookup(catalog, id)?.digest().await
}
