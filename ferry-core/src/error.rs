//! Error types for ferry-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{DatasetId, UploadStatus};

/// All errors that can arise from catalog, config and spec operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.ferry/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// No catalog document exists for the dataset.
    #[error("dataset '{id}' not found at {path}")]
    DatasetNotFound { id: DatasetId, path: PathBuf },

    /// A status change that would move a dataset backwards.
    #[error("dataset '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: DatasetId,
        from: UploadStatus,
        to: UploadStatus,
    },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A malformed `--input` / `--output` specification.
    #[error("invalid {kind} '{spec}': {reason}")]
    InvalidSpec {
        kind: &'static str,
        spec: String,
        reason: String,
    },
}

/// Convenience constructor for [`CoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.into(),
        source,
    }
}
