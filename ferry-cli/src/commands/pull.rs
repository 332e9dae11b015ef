//! `ferry pull <ID> <DIR>`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use clap::Args;
use colored::Colorize;

use ferry_core::DatasetId;

use crate::context::{block_on, Context};
use crate::progress::{bytes_bar, BarReporter};

#[derive(Args, Debug)]
pub struct PullArgs {
    /// Dataset to fetch.
    pub id: String,

    /// Destination; must be missing or empty.
    pub dir: PathBuf,
}

impl PullArgs {
    pub fn run(self) -> Result<()> {
        let ctx = Context::load()?;
        let id = DatasetId::from(self.id);
        let dir = self.dir;

        block_on(|cancel| async move {
            let handle = ctx
                .manager
                .open(&cancel, &id)
                .await
                .with_context(|| format!("failed to open dataset '{id}'"))?;
            let dataset = handle.describe().await?;
            if !dataset.status.is_complete() {
                bail!(
                    "dataset '{id}' is {}; use `ferry download` to wait for it",
                    dataset.status
                );
            }

            let bar = bytes_bar("fetching", dataset.size);
            let pulled = handle
                .pull(&cancel, &dir, Arc::new(BarReporter::new(bar.clone())))
                .await;
            bar.finish_and_clear();
            let summary =
                pulled.with_context(|| format!("failed to pull '{id}' into {}", dir.display()))?;
            handle.close();

            println!(
                "{} Pulled '{}' into {} ({} objects, {} bytes)",
                "✓".green(),
                summary.dataset,
                dir.display(),
                summary.objects,
                summary.bytes
            );
            Ok(())
        })
    }
}
