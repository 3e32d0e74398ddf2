use crate::types::field::FieldId;
use serde::{Deserialize, Serialize};

/// Metadata about the datastore directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    /// Next field identifier to be assigned
    pub next_field_id: FieldId,

    /// On-disk layout version
    pub schema_version: u32,

    /// Creation timestamp (ISO 8601)
    pub created_at: String,

    /// Last write timestamp (ISO 8601)
    pub updated_at: String,
}

/// Information about a backup operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Path where backup was written
    pub path: String,

    /// Backup timestamp (ISO 8601)
    pub timestamp: String,

    /// Size of backup in bytes
    pub size_bytes: u64,
}

/// Outcome of a committed write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteInfo {
    pub points_written: usize,
    pub values_written: usize,
    pub fields_created: usize,
}

/// Counters for one executed query
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryStats {
    /// Rows assembled from the column scans, before filtering
    pub rows_scanned: usize,
    /// Rows handed to the consumer
    pub rows_emitted: usize,
    pub chunks_emitted: usize,
}
