//! Download orchestrator: wait for an upload to finish, then fetch it.
//!
//! ```text
//!            ┌──────────── still uploading, time left ─────────────┐
//!            ▼                                                     │
//! start ──► poll ── success ──► fetch (N workers) ──► done         │
//!            │                                                     │
//!            ├── uploading/pending, expiry passed ──► UploadTimedOut
//!            └── wait min(remaining, poll_interval) ───────────────┘
//! ```
//!
//! Every await is raced against the caller's [`CancellationToken`]; a
//! cancelled download reports [`TransferError::Cancelled`], never a timeout.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ferry_core::{DatasetId, UploadStatus};

use crate::catalog::DatasetCatalog;
use crate::error::TransferError;
use crate::manager::TransferManager;
use crate::progress::ChannelReporter;

pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct DownloadConfig {
    pub dataset: DatasetId,
    pub local_dir: PathBuf,
    /// Fetch workers; values below 1 are raised to 1.
    pub concurrency: usize,
    /// Longest single wait between status polls.
    pub poll_interval: Duration,
    /// Receives cumulative byte counts; closed when the download returns.
    pub progress: Option<UnboundedSender<u64>>,
}

impl DownloadConfig {
    pub fn new(dataset: DatasetId, local_dir: impl Into<PathBuf>) -> Self {
        Self {
            dataset,
            local_dir: local_dir.into(),
            concurrency: DEFAULT_CONCURRENCY,
            poll_interval: DEFAULT_POLL_INTERVAL,
            progress: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadSummary {
    pub dataset: DatasetId,
    pub objects: usize,
    pub bytes: u64,
    /// Status checks made before the dataset was ready.
    pub polls: usize,
}

/// Wait for `config.dataset` to finish uploading, then fetch it into
/// `config.local_dir`.
pub async fn download(
    manager: &TransferManager,
    cancel: &CancellationToken,
    config: DownloadConfig,
) -> Result<DownloadSummary, TransferError> {
    let DownloadConfig {
        dataset,
        local_dir,
        concurrency,
        poll_interval,
        progress,
    } = config;
    let reporter = Arc::new(ChannelReporter::from_option(progress));
    let result = run(
        manager,
        cancel,
        &dataset,
        &local_dir,
        concurrency,
        poll_interval,
        reporter.clone(),
    )
    .await;
    reporter.close();
    result
}

async fn run(
    manager: &TransferManager,
    cancel: &CancellationToken,
    dataset: &DatasetId,
    local_dir: &std::path::Path,
    concurrency: usize,
    poll_interval: Duration,
    reporter: Arc<ChannelReporter>,
) -> Result<DownloadSummary, TransferError> {
    let polls = wait_for_upload(manager, cancel, dataset, poll_interval).await?;

    let handle = manager.open(cancel, dataset).await?;
    let fetched = handle
        .fetch_into(cancel, local_dir, concurrency.max(1), reporter)
        .await;
    handle.close();
    let fetched = fetched?;

    info!(
        dataset = %dataset,
        objects = fetched.objects,
        bytes = fetched.bytes,
        "download complete"
    );
    Ok(DownloadSummary {
        dataset: fetched.dataset,
        objects: fetched.objects,
        bytes: fetched.bytes,
        polls,
    })
}

/// Poll until the dataset reports `success`. Returns the number of polls.
async fn wait_for_upload(
    manager: &TransferManager,
    cancel: &CancellationToken,
    dataset: &DatasetId,
    poll_interval: Duration,
) -> Result<usize, TransferError> {
    let mut polls = 0usize;
    loop {
        polls += 1;
        let described = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            described = manager.catalog().describe(dataset) => described?,
        };
        if described.status == UploadStatus::Success {
            return Ok(polls);
        }

        let remaining = described.remaining_upload_time(manager.clock().now());
        let remaining = match remaining.to_std() {
            Ok(left) if !left.is_zero() => left,
            _ => {
                return Err(TransferError::UploadTimedOut {
                    id: dataset.clone(),
                    expired_at: described.upload_expire_at(),
                })
            }
        };
        debug!(
            dataset = %dataset,
            status = %described.status,
            remaining_secs = remaining.as_secs(),
            "upload still running"
        );
        wait_until(cancel, Instant::now() + remaining, poll_interval).await?;
    }
}

/// Sleep until `deadline` or for `poll_interval`, whichever comes first.
/// Never sleeps past `deadline`; returns `Cancelled` as soon as `cancel`
/// fires.
pub async fn wait_until(
    cancel: &CancellationToken,
    deadline: Instant,
    poll_interval: Duration,
) -> Result<(), TransferError> {
    let tick = Instant::now() + poll_interval;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        _ = tokio::time::sleep_until(deadline.min(tick)) => Ok(()),
    }
}

/// Archived size recorded by the uploader.
pub async fn remote_dataset_size(
    catalog: &dyn DatasetCatalog,
    id: &DatasetId,
) -> Result<u64, TransferError> {
    Ok(catalog.describe(id).await?.size)
}
