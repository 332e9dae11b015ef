//! `ferry push <DIR> [--name <ID>] [--shards <N>]`

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use colored::Colorize;

use ferry_core::{ArchiverConfig, ArchiverKind, DatasetId};

use crate::context::{block_on, Context};
use crate::progress::{bytes_bar, BarReporter};

#[derive(Args, Debug)]
pub struct PushArgs {
    /// Directory to archive.
    pub dir: PathBuf,

    /// Dataset id to record. Generated when omitted.
    #[arg(long)]
    pub name: Option<String>,

    /// Split the archive into this many independent shards.
    #[arg(long)]
    pub shards: Option<usize>,
}

impl PushArgs {
    pub fn run(self) -> Result<()> {
        let ctx = Context::load()?;
        let archiver = archiver_for(&ctx.config.archiver, self.shards);
        let name = self.name.map(DatasetId::from);
        let dir = self.dir;

        block_on(|cancel| async move {
            let handle = ctx
                .manager
                .create(&cancel, name, ctx.config.storage.clone(), archiver)
                .await
                .context("failed to create dataset")?;

            let bar = bytes_bar("uploading", 0);
            let pushed = handle
                .push(&cancel, &dir, Arc::new(BarReporter::new(bar.clone())))
                .await;
            bar.finish_and_clear();
            let summary = pushed.with_context(|| {
                format!("failed to push {} into '{}'", dir.display(), handle.dataset())
            })?;
            handle.close();

            println!(
                "{} Pushed {} as '{}' ({} objects, {} bytes)",
                "✓".green(),
                dir.display(),
                summary.dataset,
                summary.objects,
                summary.bytes
            );
            Ok(())
        })
    }
}

/// Configured archiver, switched to the sharded layout when `--shards` is set.
pub(crate) fn archiver_for(base: &ArchiverConfig, shards: Option<usize>) -> ArchiverConfig {
    match shards {
        Some(shards) => ArchiverConfig {
            kind: ArchiverKind::Sharded,
            shards,
            ..base.clone()
        },
        None => base.clone(),
    }
}
