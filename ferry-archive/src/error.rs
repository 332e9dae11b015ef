//! Error types for ferry-archive.

use std::path::PathBuf;

use thiserror::Error;

use ferry_core::ObjectKey;

/// All errors that can arise while archiving or extracting a tree.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failure while walking the source tree.
    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    /// The archive source is not a directory.
    #[error("archive source {path} is not a directory")]
    NotADirectory { path: PathBuf },

    #[error("key prefix '{prefix}' must be empty or end with a forward slash")]
    InvalidKeyPrefix { prefix: String },

    #[error("shard count {shards} is outside 1..={max}")]
    InvalidShardCount { shards: usize, max: usize },

    /// Extraction target already holds files.
    #[error("directory is not empty: {path}")]
    DestinationNotEmpty { path: PathBuf },

    /// Two archive entries resolved to the same file.
    #[error("refusing to overwrite existing entry {path}")]
    EntryExists { path: PathBuf },

    /// An entry name that is absolute, contains `..`, or is not UTF-8.
    #[error("unsafe entry name '{name}'")]
    UnsafeEntryName { name: String },

    /// A symlink whose target is absolute or leaves the destination.
    #[error("symlink '{name}' points outside the destination: {target}")]
    UnsafeSymlink { name: String, target: String },

    /// An entry the configured symlink policy does not allow.
    #[error("unsupported {kind} at {path}")]
    UnsupportedEntry { path: PathBuf, kind: &'static str },

    /// A key this archiver never produces.
    #[error("key '{key}' is not part of this archive")]
    UnknownKey { key: ObjectKey },

    /// A visit or fetch callback stopped the operation.
    #[error("interrupted while handling '{key}'")]
    Interrupted { key: ObjectKey },
}

/// Convenience constructor for [`ArchiveError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ArchiveError {
    ArchiveError::Io {
        path: path.into(),
        source,
    }
}
