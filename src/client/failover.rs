//! Local file store backing offline operation.
//!
//! Two trees under `<local_dir>/<agent>/`:
//! - `failover/` - operator-managed override files; presence and mtime are
//!   the only signals the reconciliation logic consults
//! - `snapshot/` - best-effort copies of server content written after every
//!   successful fetch, read back when no server is reachable
//!
//! Both lay keys out as `[tenant/]group/data_id`.

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use tracing::error;

use crate::ConfigKey;
use crate::Result;
use crate::StorageError;

#[derive(Debug, Clone)]
pub struct LocalConfigStore {
    failover_root: PathBuf,
    snapshot_root: PathBuf,
}

impl LocalConfigStore {
    pub fn new(
        base: &Path,
        agent_name: &str,
    ) -> Self {
        let root = base.join(agent_name);
        Self {
            failover_root: root.join("failover"),
            snapshot_root: root.join("snapshot"),
        }
    }

    pub fn failover_path(
        &self,
        key: &ConfigKey,
    ) -> PathBuf {
        Self::key_path(&self.failover_root, key)
    }

    pub fn snapshot_path(
        &self,
        key: &ConfigKey,
    ) -> PathBuf {
        Self::key_path(&self.snapshot_root, key)
    }

    fn key_path(
        root: &Path,
        key: &ConfigKey,
    ) -> PathBuf {
        let mut path = root.to_path_buf();
        if key.has_tenant() {
            path.push(&key.tenant);
        }
        path.push(&key.group);
        path.push(&key.data_id);
        path
    }

    /// Modification time of the failover file in millis, `None` when absent
    pub fn failover_mtime_millis(
        &self,
        key: &ConfigKey,
    ) -> Result<Option<u64>> {
        let path = self.failover_path(key);
        match fs::metadata(&path) {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .map_err(|e| StorageError::PathError { path, source: e })?;
                let millis = mtime
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                Ok(Some(millis))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::PathError { path, source: e }.into()),
        }
    }

    pub fn read_failover(
        &self,
        key: &ConfigKey,
    ) -> Result<Option<String>> {
        Self::read_optional(self.failover_path(key))
    }

    pub fn read_snapshot(
        &self,
        key: &ConfigKey,
    ) -> Result<Option<String>> {
        Self::read_optional(self.snapshot_path(key))
    }

    /// Persist (or with `None`, delete) the snapshot copy of one key.
    /// Best-effort by contract: callers log and continue on error.
    pub fn save_snapshot(
        &self,
        key: &ConfigKey,
        content: Option<&str>,
    ) -> Result<()> {
        let path = self.snapshot_path(key);
        match content {
            Some(text) => {
                if let Some(parent) = path.parent() {
                    if !parent.exists() {
                        if let Err(e) = fs::create_dir_all(parent) {
                            error!("Failed to create snapshot directory: {:?}", e);
                            return Err(StorageError::IoError(e).into());
                        }
                    }
                }
                fs::write(&path, text).map_err(|e| StorageError::PathError { path, source: e })?;
            }
            None => match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::PathError { path, source: e }.into()),
            },
        }
        Ok(())
    }

    fn read_optional(path: PathBuf) -> Result<Option<String>> {
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::PathError { path, source: e }.into()),
        }
    }
}
