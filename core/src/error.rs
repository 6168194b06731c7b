//! Error types for nehmen-core.

use std::path::PathBuf;

/// Result type for nehmen-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the entry store.
///
/// A missing record is never an error: lookups return `None` or an empty list.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A migration step failed; the whole upgrade was rolled back.
    #[error("Schema upgrade to version {version} failed: {source}")]
    SchemaUpgradeFailed {
        version: u32,
        source: rusqlite::Error,
    },

    /// The file was written by a newer build.
    #[error("Database schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: u32, supported: u32 },

    /// A write could not be committed.
    #[error("Storage write failed: {0}")]
    StorageWriteFailed(#[source] rusqlite::Error),

    /// A query could not be completed.
    #[error("Storage read failed: {0}")]
    StorageReadFailed(#[source] rusqlite::Error),

    /// Failed to open the database file.
    #[error("Failed to open database {path}: {source}")]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Failed to create the database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A settings value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The blocking task running a store operation did not finish.
    #[error("Store task failed: {0}")]
    TaskFailed(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn write(err: rusqlite::Error) -> Self {
        Self::StorageWriteFailed(err)
    }

    pub(crate) fn read(err: rusqlite::Error) -> Self {
        Self::StorageReadFailed(err)
    }
}
