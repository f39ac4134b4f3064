//! Data directory provisioning for server instances.
//!
//! When the caller supplies no data directory, a temporary one is created and
//! removed again when the instance stops. When a directory is supplied, its
//! contents decide whether the instance is "fresh" (empty, safe to bootstrap
//! users into) or "existing" (non-empty, bootstrap skipped unless forced).

use std::path::Path;

use tempfile::TempDir;
use tracing::debug;

use crate::error::{Error, Result};

/// Create an auto-cleaned temporary data directory.
///
/// The returned [`TempDir`] removes the directory when dropped or explicitly
/// closed; the orchestrator holds it for the lifetime of the instance.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directory cannot be created.
pub fn provision() -> Result<TempDir> {
    let dir = TempDir::with_prefix("mongolet-")
        .map_err(|source| Error::io("creating temporary data directory", source))?;
    debug!(path = %dir.path().display(), "provisioned temporary data directory");
    Ok(dir)
}

/// Whether `path` is a fresh data directory.
///
/// Fresh means empty or not yet existing (it is created in that case, the way
/// the server itself would refuse to). A non-empty directory holds data from
/// a previous run.
///
/// # Errors
///
/// Returns [`Error::PathUnreadable`] if the directory exists but cannot be
/// listed, or [`Error::Io`] if an absent directory cannot be created.
pub fn is_fresh(path: &Path) -> Result<bool> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .map_err(|source| Error::io(format!("creating data directory {}", path.display()), source))?;
        return Ok(true);
    }

    let mut entries = std::fs::read_dir(path).map_err(|source| Error::PathUnreadable {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(entries.next().is_none())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provision_creates_directory() {
        let dir = provision().unwrap();
        assert!(dir.path().is_dir());
        let path = dir.path().to_path_buf();
        drop(dir);
        assert!(!path.exists());
    }

    #[test]
    fn test_empty_directory_is_fresh() {
        let dir = provision().unwrap();
        assert!(is_fresh(dir.path()).unwrap());
    }

    #[test]
    fn test_nonempty_directory_is_existing() {
        let dir = provision().unwrap();
        std::fs::write(dir.path().join("WiredTiger.wt"), b"data").unwrap();
        assert!(!is_fresh(dir.path()).unwrap());
    }

    #[test]
    fn test_missing_directory_is_created_and_fresh() {
        let dir = provision().unwrap();
        let nested = dir.path().join("does-not-exist-yet");
        assert!(is_fresh(&nested).unwrap());
        assert!(nested.is_dir());
    }
}
