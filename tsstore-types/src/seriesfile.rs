//! The §6.3 `SeriesFile` capability interface.
//!
//! One series file per database, shared by every shard of that database
//! (spec §3). Internal layout is out of scope (spec §1); the Store only
//! opens/closes it per database and removes series ids by identifier.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait SeriesFile: Send + Sync {
    async fn open(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
    fn with_max_compaction_concurrency(&self, n: usize);
    fn delete_series_id(&self, id: u64) -> Result<()>;
}
