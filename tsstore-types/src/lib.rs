//! Capability interfaces, error taxonomy, and cardinality primitives for
//! `tsstore-core`'s Store/Catalog.
//!
//! Everything a shard, its index, and its series file actually *are* is out of
//! scope (spec §1) — this crate only defines the traits the Store drives them
//! through (§6), the typed errors the catalog boundary surfaces (§7), the
//! bounded-concurrency/byte-rate primitives shared across the Store (§5), and
//! the cardinality data structures (§4.4.4).

pub mod authorizer;
pub mod bitset;
pub mod config;
pub mod error;
pub mod expr;
pub mod ids;
pub mod index;
pub mod limiter;
pub mod opener;
pub mod seriesfile;
pub mod shard;
pub mod sketch;
pub mod stats;

#[cfg(any(test, feature = "test-util"))]
pub mod in_memory;

pub use authorizer::{AllowAll, Authorizer};
pub use bitset::SeriesIdSet;
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use ids::{Database, RetentionPolicy, ShardId};
pub use index::Index;
pub use limiter::{Limiter, RateLimiter};
pub use opener::ShardOpener;
pub use seriesfile::SeriesFile;
pub use shard::{Shard, SketchPair, WritePreview};
pub use sketch::Sketch;
pub use stats::{DatabaseStatistics, ShardStatistics};
