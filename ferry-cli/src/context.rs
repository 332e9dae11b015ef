//! Shared setup for commands that talk to the dataset store.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tokio_util::sync::CancellationToken;

use ferry_core::{config, TransferConfig};
use ferry_transfer::{FileCatalog, LocalConnector, TransferManager};

pub struct Context {
    pub config: TransferConfig,
    pub manager: TransferManager,
}

impl Context {
    /// Load `~/.ferry/config.yaml` and wire a manager over the local store.
    pub fn load() -> Result<Self> {
        let home = home_dir()?;
        let config = config::load_at(&home).with_context(|| {
            format!(
                "failed to load {}",
                config::config_path_at(&home).display()
            )
        })?;
        let manager = TransferManager::new(
            Arc::new(FileCatalog::new(&config.storage.root)),
            Arc::new(LocalConnector),
            config.transfer.clone(),
        );
        Ok(Self { config, manager })
    }
}

pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Run `task` on a fresh runtime. Ctrl-C cancels the token it receives.
pub fn block_on<T, F, Fut>(task: F) -> Result<T>
where
    F: FnOnce(CancellationToken) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("received ctrl-c, cancelling");
                on_signal.cancel();
            }
        });
        task(cancel).await
    })
}
