use crate::error::{ChronosError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a datastore directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreConfig {
    /// Directory holding the store. Created on open if missing.
    pub path: PathBuf,

    /// Maximum map size for LMDB (in bytes)
    /// Default: 1GB
    #[serde(default = "default_map_size")]
    pub map_size: usize,

    /// Maximum number of concurrent readers (LMDB specific)
    /// Default: 126
    #[serde(default = "default_max_readers")]
    pub max_readers: u32,

    /// Sync mode for durability
    #[serde(default)]
    pub sync_mode: SyncMode,

    /// Maximum number of points handed to the result consumer per chunk (default: 1000)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// Calls `fsync()` on every commit.
    Full,

    /// Skips syncing the LMDB meta-page on each commit (default).
    ///
    /// An OS crash may lose the last transaction but leaves the store consistent.
    #[default]
    NoMetaSync,

    /// Leaves flushing to the OS page cache. Only for tests and throwaway data.
    NoSync,
}

fn default_map_size() -> usize {
    1024 * 1024 * 1024
}

fn default_max_readers() -> u32 {
    126
}

fn default_chunk_size() -> usize {
    1000
}

impl DatastoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            map_size: default_map_size(),
            max_readers: default_max_readers(),
            sync_mode: SyncMode::default(),
            chunk_size: default_chunk_size(),
        }
    }

    pub fn with_map_size(mut self, map_size: usize) -> Self {
        self.map_size = map_size;
        self
    }

    pub fn with_max_readers(mut self, max_readers: u32) -> Self {
        self.max_readers = max_readers;
        self
    }

    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Set the maximum number of points per yielded chunk
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Check the settings that can be checked without touching the filesystem
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(ChronosError::Config("datastore path is empty".into()));
        }
        if self.chunk_size == 0 {
            return Err(ChronosError::Config("chunk_size must be positive".into()));
        }
        if self.map_size == 0 {
            return Err(ChronosError::Config("map_size must be positive".into()));
        }
        if self.max_readers == 0 {
            return Err(ChronosError::Config("max_readers must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let cfg: DatastoreConfig = serde_json::from_str(r#"{"path": "/tmp/chronos"}"#).unwrap();
        assert_eq!(cfg.chunk_size, 1000);
        assert_eq!(cfg.max_readers, 126);
        assert_eq!(cfg.sync_mode, SyncMode::NoMetaSync);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_path_and_zero_chunk() {
        assert!(matches!(
            DatastoreConfig::new("").validate(),
            Err(ChronosError::Config(_))
        ));
        assert!(matches!(
            DatastoreConfig::new("/tmp/x").with_chunk_size(0).validate(),
            Err(ChronosError::Config(_))
        ));
    }
}
