//! `ferry dataset list` and `ferry dataset describe <ID>`

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use ferry_core::{Dataset, DatasetId, StorageLocation, UploadStatus};

use crate::context::{block_on, Context};

#[derive(Subcommand, Debug)]
pub enum DatasetCommand {
    /// List every recorded dataset.
    List,

    /// Show one dataset's record.
    Describe(DescribeArgs),
}

#[derive(Args, Debug)]
pub struct DescribeArgs {
    pub id: String,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(command: DatasetCommand) -> Result<()> {
    let ctx = Context::load()?;
    match command {
        DatasetCommand::List => list(ctx),
        DatasetCommand::Describe(args) => describe(ctx, args),
    }
}

#[derive(Tabled)]
struct DatasetRow {
    #[tabled(rename = "id")]
    id: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "size")]
    size: u64,
    #[tabled(rename = "layout")]
    layout: String,
    #[tabled(rename = "updated")]
    updated: String,
}

fn list(ctx: Context) -> Result<()> {
    let datasets = block_on(|_| async move {
        ctx.manager
            .catalog()
            .list()
            .await
            .context("failed to read dataset catalog")
    })?;

    if datasets.is_empty() {
        println!("No datasets recorded.");
        println!("Run: ferry push <DIR>");
        return Ok(());
    }

    let rows: Vec<DatasetRow> = datasets
        .iter()
        .map(|d| DatasetRow {
            id: d.id.to_string(),
            status: colored_status(d.status),
            size: d.size,
            layout: layout(d),
            updated: d.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

#[derive(Serialize)]
struct DescribeJson<'a> {
    #[serde(flatten)]
    dataset: &'a Dataset,
    location: StorageLocation,
    upload_expire_at: String,
    keys: Vec<String>,
}

fn describe(ctx: Context, args: DescribeArgs) -> Result<()> {
    let id = DatasetId::from(args.id);
    let dataset = block_on(|_| {
        let id = id.clone();
        async move {
            ctx.manager
                .catalog()
                .describe(&id)
                .await
                .with_context(|| format!("failed to describe dataset '{id}'"))
        }
    })?;
    let keys: Vec<String> = object_keys(&dataset)?;

    if args.json {
        let json = DescribeJson {
            dataset: &dataset,
            location: dataset.location(),
            upload_expire_at: dataset.upload_expire_at().to_rfc3339(),
            keys,
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!("{}", dataset.id.to_string().bold());
    println!("  status:   {}", colored_status(dataset.status));
    println!("  size:     {} bytes", dataset.size);
    let location = dataset.location();
    println!("  bucket:   {}", location.bucket);
    println!("  root:     {}", location.root);
    println!("  layout:   {}", layout(&dataset));
    println!("  created:  {}", dataset.created_at.to_rfc3339());
    println!("  updated:  {}", dataset.updated_at.to_rfc3339());
    if !dataset.status.is_complete() {
        println!("  expires:  {}", dataset.upload_expire_at().to_rfc3339());
    }
    println!("  objects:");
    for key in keys {
        println!("    - {key}");
    }
    Ok(())
}

fn object_keys(dataset: &Dataset) -> Result<Vec<String>> {
    let archiver = ferry_archive::from_config(&dataset.archiver)
        .with_context(|| format!("dataset '{}' has an invalid archiver", dataset.id))?;
    Ok(archiver.keys()?.into_iter().map(|k| k.0).collect())
}

fn layout(dataset: &Dataset) -> String {
    match dataset.archiver.kind {
        ferry_core::ArchiverKind::Tar => "tar".to_string(),
        ferry_core::ArchiverKind::Sharded => format!("sharded x{}", dataset.archiver.shards),
    }
}

pub(crate) fn colored_status(status: UploadStatus) -> String {
    match status {
        UploadStatus::Success => status.to_string().green().to_string(),
        UploadStatus::Uploading => status.to_string().yellow().to_string(),
        UploadStatus::Pending => status.to_string().dimmed().to_string(),
    }
}
