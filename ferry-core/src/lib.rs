//! Ferry core library — dataset domain types, catalog persistence,
//! configuration, and job input/output specs.
//!
//! - [`types`] — newtypes and the [`Dataset`] record
//! - [`error`] — [`CoreError`]
//! - [`catalog`] — per-dataset YAML documents (load / save / list)
//! - [`config`] — `~/.ferry/config.yaml`
//! - [`spec`] — `<DIR|DATASET_ID>:<JOB_DIR>` parsing

pub mod catalog;
pub mod config;
pub mod error;
pub mod spec;
pub mod types;

pub use config::{
    ArchiverConfig, ArchiverKind, StorageConfig, SymlinkPolicy, TransferConfig, TransferSettings,
};
pub use error::CoreError;
pub use spec::{InputSource, InputSpec, OutputSpec};
pub use types::{Dataset, DatasetId, ObjectKey, StorageLocation, UploadStatus};
