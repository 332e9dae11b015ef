use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use ferry_archive::ArchiveError;
use ferry_core::{CoreError, DatasetId, ObjectKey};

/// Failures of an [`ObjectStore`](crate::storage::ObjectStore).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object '{key}' not found")]
    NotFound { key: ObjectKey },

    #[error("I/O error on object '{key}' at {path}: {source}")]
    Io {
        key: ObjectKey,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stream error on object '{key}': {source}")]
    Stream {
        key: ObjectKey,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid object key '{key}'")]
    InvalidKey { key: ObjectKey },

    #[error("cannot connect to bucket '{bucket}': {reason}")]
    Connect { bucket: String, reason: String },
}

/// Failures of a [`DatasetCatalog`](crate::catalog::DatasetCatalog).
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("dataset '{id}' not found")]
    NotFound { id: DatasetId },

    #[error("dataset '{id}' already exists")]
    AlreadyExists { id: DatasetId },

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("catalog task failed: {0}")]
    Join(String),
}

/// Error surface for handles, the manager and the download orchestrator.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The dataset was still being uploaded when its upload expiry passed.
    #[error("dataset '{id}' upload did not finish before {expired_at}")]
    UploadTimedOut {
        id: DatasetId,
        expired_at: DateTime<Utc>,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("handle for dataset '{id}' is closed")]
    HandleClosed { id: DatasetId },

    #[error("task join failure: {0}")]
    Join(String),
}

impl TransferError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, TransferError::UploadTimedOut { .. })
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> TransferError {
    TransferError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn join_err(err: tokio::task::JoinError) -> TransferError {
    TransferError::Join(err.to_string())
}
