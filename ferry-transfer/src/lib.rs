//! Dataset transfers: manager, handles, and the download orchestrator.

pub mod catalog;
pub mod clock;
pub mod download;
mod error;
pub mod handle;
pub mod manager;
pub mod progress;
pub mod storage;

pub use catalog::{DatasetCatalog, FileCatalog, MemoryCatalog, StatusUpdate};
pub use clock::{Clock, SystemClock, TokioClock};
pub use download::{download, remote_dataset_size, wait_until, DownloadConfig, DownloadSummary};
pub use error::{CatalogError, StorageError, TransferError};
pub use handle::{FetchSummary, Handle, PushSummary};
pub use manager::TransferManager;
pub use progress::{ChannelReporter, DiscardReporter, ProgressCounter, Reporter};
pub use storage::{
    LocalConnector, LocalStore, MemoryConnector, MemoryStore, ObjectStore, StoreConnector,
};

/// Install the global `fmt` subscriber. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
