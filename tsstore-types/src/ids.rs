//! Small newtypes for the catalog's identity space.
//!
//! The catalog keys a lot of maps by shard id, database name, and retention
//! policy name. Earlier drafts of this crate used bare `u64`/`String` for all
//! three and it was easy to pass a retention policy name where a database name
//! was expected at a call site several functions deep. These newtypes buy that
//! back at zero runtime cost.

use std::fmt;

/// Unique 64-bit identifier for a shard, assigned by the caller of `CreateShard`
/// (the Store does not allocate ids itself) and unique across all databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct ShardId(pub u64);

impl ShardId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ShardId {
    fn from(id: u64) -> Self {
        ShardId(id)
    }
}

/// Database namespace name, e.g. the first path segment under the store root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Database(pub String);

impl Database {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Database {
    fn from(s: &str) -> Self {
        Database(s.to_string())
    }
}

impl From<String> for Database {
    fn from(s: String) -> Self {
        Database(s)
    }
}

/// Retention policy namespace name, the second path segment under a database.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct RetentionPolicy(pub String);

impl RetentionPolicy {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RetentionPolicy {
    fn from(s: &str) -> Self {
        RetentionPolicy(s.to_string())
    }
}

impl From<String> for RetentionPolicy {
    fn from(s: String) -> Self {
        RetentionPolicy(s)
    }
}
