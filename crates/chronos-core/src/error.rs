use crate::types::FieldType;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChronosError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Directory {} is already owned by an open datastore", .0.display())]
    DirectoryLocked(PathBuf),

    #[error("Datastore is not open")]
    NotOpen,

    #[error("Datastore is already open")]
    AlreadyOpen,

    #[error("Field {field} of series {series} is declared {declared} but registered as {existing}")]
    FieldTypeConflict {
        series: String,
        field: String,
        existing: FieldType,
        declared: FieldType,
    },

    #[error("Malformed point: {0}")]
    MalformedPoint(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt record: {0}")]
    Corruption(String),

    #[error("Query plan error: {0}")]
    QueryPlan(String),

    #[error("Query aborted by result consumer: {0}")]
    CallbackAbort(anyhow::Error),
}

impl ChronosError {
    /// True for failures of the underlying storage engine (disk, LMDB, corrupt records).
    pub fn is_storage_io(&self) -> bool {
        matches!(
            self,
            ChronosError::Io(_) | ChronosError::Storage(_) | ChronosError::Corruption(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChronosError>;
