//! `ferry download <ID> <DIR> [--concurrency <N>] [--timeout <SECS>]`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use colored::Colorize;

use ferry_core::DatasetId;
use ferry_transfer::{download, DownloadConfig};

use crate::context::{block_on, Context};
use crate::progress::{bytes_bar, follow};

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Dataset to fetch.
    pub id: String,

    /// Destination; must be missing or empty.
    pub dir: PathBuf,

    /// Parallel object fetches. Defaults to `transfer.concurrency`.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Give up after this many seconds, whatever the upload expiry says.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

impl DownloadArgs {
    pub fn run(self) -> Result<()> {
        let ctx = Context::load()?;
        let id = DatasetId::from(self.id);
        let dir = self.dir;
        let concurrency = self.concurrency.unwrap_or(ctx.config.transfer.concurrency);
        let poll_interval = Duration::from_secs(ctx.config.transfer.poll_interval_secs);
        let timeout = self.timeout;

        block_on(|cancel| async move {
            let token = cancel.child_token();
            if let Some(secs) = timeout {
                let deadline = token.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    deadline.cancel();
                });
            }

            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let bars = follow(bytes_bar("downloading", 0), rx);
            let config = DownloadConfig {
                concurrency,
                poll_interval,
                progress: Some(tx),
                ..DownloadConfig::new(id.clone(), &dir)
            };
            let result = download(&ctx.manager, &token, config).await;
            // The orchestrator closes the channel on return, so this ends.
            let _ = bars.await;

            let summary = match result {
                Ok(summary) => summary,
                // Only the --timeout timer cancels the child token alone.
                Err(err) if err.is_cancelled() && !cancel.is_cancelled() => {
                    bail!(
                        "download of '{id}' did not finish within {}s",
                        timeout.unwrap_or_default()
                    );
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to download '{id}' into {}", dir.display()))
                }
            };

            println!(
                "{} Downloaded '{}' into {} ({} objects, {} bytes, {} polls)",
                "✓".green(),
                summary.dataset,
                dir.display(),
                summary.objects,
                summary.bytes,
                summary.polls
            );
            Ok(())
        })
    }
}
