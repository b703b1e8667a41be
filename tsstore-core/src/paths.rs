//! Directory layout helpers — spec §6.1.
//!
//! ```text
//! <root>/<database>/_series/…               series file
//! <root>/<database>/<rp>/<shardID>/…        shard data
//! <walRoot>/<database>/<rp>/<shardID>/…     shard WAL
//! ```

use std::path::{Path, PathBuf};

use tsstore_types::{Database, Error, RetentionPolicy, Result, ShardId};

pub const SERIES_DIR: &str = "_series";

pub fn series_file_dir(root: &Path, database: &Database) -> PathBuf {
    root.join(database.as_str()).join(SERIES_DIR)
}

pub fn retention_policy_dir(root: &Path, database: &Database, rp: &RetentionPolicy) -> PathBuf {
    root.join(database.as_str()).join(rp.as_str())
}

pub fn shard_dir(root: &Path, database: &Database, rp: &RetentionPolicy, id: ShardId) -> PathBuf {
    retention_policy_dir(root, database, rp).join(id.get().to_string())
}

pub fn database_dir(root: &Path, database: &Database) -> PathBuf {
    root.join(database.as_str())
}

/// Creates `path` (and parents) with mode 0700, matching spec §6.1's
/// "directory mode 0700 for data and WAL subtrees".
pub fn create_dir_0700(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::Io { path: path.to_path_buf(), source: e })?;
    set_mode_0700(path)
}

#[cfg(unix)]
fn set_mode_0700(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| Error::Io { path: path.to_path_buf(), source: e })
}

#[cfg(not(unix))]
fn set_mode_0700(_path: &Path) -> Result<()> {
    Ok(())
}

/// Validates that `path` is exactly `expected_depth` components below
/// `root` once both are canonicalized, refusing anything a `..`/symlink
/// traversal could have escaped outside the store root (spec §4.3.3/§4.3.4:
/// "refuses paths that escape via traversal").
pub fn validate_depth_below_root(root: &Path, path: &Path, expected_depth: usize) -> Result<PathBuf> {
    let canonical_root = std::fs::canonicalize(root).map_err(|e| Error::Io { path: root.to_path_buf(), source: e })?;
    let canonical_path = match std::fs::canonicalize(path) {
        Ok(p) => p,
        // The path may not exist yet (e.g. a directory already removed by a
        // racing delete) — fall back to lexical validation against the root.
        Err(_) => canonical_root.join(
            path.strip_prefix(root)
                .map_err(|_| Error::PathEscape { path: path.to_path_buf(), reason: "not under store root" })?,
        ),
    };
    let relative = canonical_path
        .strip_prefix(&canonical_root)
        .map_err(|_| Error::PathEscape { path: path.to_path_buf(), reason: "escapes store root" })?;
    let depth = relative.components().count();
    if depth != expected_depth {
        return Err(Error::PathEscape {
            path: path.to_path_buf(),
            reason: "not at the expected depth below store root",
        });
    }
    Ok(canonical_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_expected_relative_layout() {
        let root = Path::new("/data");
        let db = Database::from("db0");
        let rp = RetentionPolicy::from("rp0");
        assert_eq!(series_file_dir(root, &db), PathBuf::from("/data/db0/_series"));
        assert_eq!(retention_policy_dir(root, &db, &rp), PathBuf::from("/data/db0/rp0"));
        assert_eq!(shard_dir(root, &db, &rp, ShardId(7)), PathBuf::from("/data/db0/rp0/7"));
    }

    #[test]
    fn rejects_path_outside_root() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let outside = root.parent().unwrap();
        let err = validate_depth_below_root(root, outside, 1).unwrap_err();
        assert!(matches!(err, Error::PathEscape { .. }));
    }

    #[test]
    fn accepts_path_at_expected_depth() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let db_dir = root.join("db0");
        std::fs::create_dir_all(&db_dir).unwrap();
        let validated = validate_depth_below_root(root, &db_dir, 1).unwrap();
        assert_eq!(validated, std::fs::canonicalize(&db_dir).unwrap());
    }
}
