pub mod catalog;
pub mod chain;
pub mod cli;
pub mod extractor;
pub mod filesystem;
pub mod scanner;
pub mod store;
pub mod types;
pub mod wrapper;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SqlBackupError {
    #[error("Extraction error for {path:?}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("Malformed backup record in {path:?} at position {position}: {reason}")]
    MalformedRecord {
        path: PathBuf,
        position: i32,
        reason: RecordViolation,
    },

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Invalid value for field {field}: {value:?}")]
    InvalidField { field: String, value: String },

    #[error("Unsupported backup type: {0}")]
    UnsupportedBackupType(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SqlBackupError>;

// Re-export key types for convenience
pub use catalog::{BackupCatalog, CatalogEntry};
pub use chain::{ChainResolver, LogChain, LsnGap, RestoreChain};
pub use extractor::{ManifestExtractor, MetadataExtractor, SqlCmdExtractor};
pub use filesystem::{FileSystem, MockFileSystem, OsFileSystem};
pub use scanner::PathScanner;
pub use store::{BackupStore, RestorePlan, RestoreStep};
pub use types::{
    BackupDatabaseFile, BackupHeader, BackupMediaHeader, BackupType, Lsn, RecordViolation,
};
