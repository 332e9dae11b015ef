//! `ferry stage --input <DIR|ID>:<JOB_DIR> --output <JOB_DIR>[:ID]`
//!
//! Local input directories are pushed into fresh datasets, dataset inputs
//! are checked to exist, and outputs are opened or created. The result is
//! the volume mapping a job runner mounts.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use ferry_core::{DatasetId, InputSource, InputSpec, OutputSpec, UploadStatus};
use ferry_transfer::{CatalogError, DiscardReporter, Handle, TransferError};

use crate::commands::dataset::colored_status;
use crate::context::{block_on, Context};

#[derive(Args, Debug)]
pub struct StageArgs {
    /// `<DIR|DATASET_ID>:<JOB_DIR>`; repeatable.
    #[arg(long = "input", short = 'i', value_name = "SPEC")]
    pub inputs: Vec<String>,

    /// `<JOB_DIR>[:DATASET_ID]`; repeatable.
    #[arg(long = "output", short = 'o', value_name = "SPEC")]
    pub outputs: Vec<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Mount {
    direction: &'static str,
    dataset: String,
    job_dir: String,
    status: UploadStatus,
}

impl StageArgs {
    pub fn run(self) -> Result<()> {
        // Parse everything before touching the store.
        let home = crate::context::home_dir()?;
        let inputs = self
            .inputs
            .iter()
            .map(|spec| {
                InputSpec::parse_at(spec, &home).with_context(|| format!("bad --input '{spec}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        let outputs = self
            .outputs
            .iter()
            .map(|spec| OutputSpec::parse(spec).with_context(|| format!("bad --output '{spec}'")))
            .collect::<Result<Vec<_>>>()?;

        let ctx = Context::load()?;
        let mounts = block_on(|cancel| async move {
            let mut mounts = Vec::with_capacity(inputs.len() + outputs.len());
            for input in inputs {
                let handle = stage_input(&ctx, &cancel, &input).await?;
                mounts.push(mount("input", &handle, input.job_dir).await?);
            }
            for output in outputs {
                let handle = stage_output(&ctx, &cancel, output.dataset).await?;
                mounts.push(mount("output", &handle, output.job_dir).await?);
            }
            Ok(mounts)
        })?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&mounts)?);
            return Ok(());
        }
        for m in &mounts {
            println!(
                "{:<6} {} -> {} [{}]",
                m.direction,
                m.dataset.bold(),
                m.job_dir,
                colored_status(m.status)
            );
        }
        Ok(())
    }
}

async fn stage_input(ctx: &Context, cancel: &CancellationToken, input: &InputSpec) -> Result<Handle> {
    match &input.source {
        InputSource::LocalDir(dir) => {
            let handle = create(ctx, cancel, None)
                .await
                .context("failed to create input dataset")?;
            handle
                .push(cancel, dir, Arc::new(DiscardReporter))
                .await
                .with_context(|| format!("failed to push {}", dir.display()))?;
            Ok(handle)
        }
        InputSource::Dataset(id) => ctx
            .manager
            .open(cancel, id)
            .await
            .with_context(|| format!("input dataset '{id}' is not available")),
    }
}

async fn stage_output(
    ctx: &Context,
    cancel: &CancellationToken,
    dataset: Option<DatasetId>,
) -> Result<Handle> {
    let handle = match dataset {
        None => create(ctx, cancel, None).await,
        Some(id) => match ctx.manager.open(cancel, &id).await {
            Err(TransferError::Catalog(CatalogError::NotFound { .. })) => {
                create(ctx, cancel, Some(id)).await
            }
            other => other,
        },
    };
    handle.context("failed to prepare output dataset")
}

async fn create(
    ctx: &Context,
    cancel: &CancellationToken,
    name: Option<DatasetId>,
) -> Result<Handle, TransferError> {
    ctx.manager
        .create(
            cancel,
            name,
            ctx.config.storage.clone(),
            ctx.config.archiver.clone(),
        )
        .await
}

async fn mount(direction: &'static str, handle: &Handle, job_dir: String) -> Result<Mount> {
    let dataset = handle.describe().await?;
    handle.close();
    Ok(Mount {
        direction,
        dataset: dataset.id.to_string(),
        job_dir,
        status: dataset.status,
    })
}
