//! Ferry: move directory trees in and out of dataset storage.
//!
//! # Usage
//!
//! ```text
//! ferry push <DIR> [--name <ID>] [--shards <N>]
//! ferry pull <ID> <DIR>
//! ferry download <ID> <DIR> [--concurrency <N>] [--timeout <SECS>]
//! ferry dataset list
//! ferry dataset describe <ID> [--json]
//! ferry stage --input <DIR|ID>:<JOB_DIR> --output <JOB_DIR>[:ID] [--json]
//! ferry config show|init
//! ferry auth status|login
//! ```

mod commands;
mod context;
mod progress;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    auth::AuthCommand, config::ConfigCommand, dataset::DatasetCommand, download::DownloadArgs,
    pull::PullArgs, push::PushArgs, stage::StageArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "ferry",
    version,
    about = "Archive directory trees into dataset storage and fetch them back",
    long_about = None,
)]
struct Cli {
    /// Log at debug level (RUST_LOG overrides).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Archive a local directory into a new dataset.
    Push(PushArgs),

    /// Fetch a finished dataset into an empty directory, one object at a time.
    Pull(PullArgs),

    /// Wait for a dataset's upload to finish, then fetch it concurrently.
    Download(DownloadArgs),

    /// Inspect recorded datasets.
    Dataset {
        #[command(subcommand)]
        command: DatasetCommand,
    },

    /// Resolve job input/output specs into datasets.
    Stage(StageArgs),

    /// Show or initialise ~/.ferry/config.yaml.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Inspect or store credentials.
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    ferry_transfer::init_tracing(cli.verbose);
    match cli.command {
        Commands::Push(args) => args.run(),
        Commands::Pull(args) => args.run(),
        Commands::Download(args) => args.run(),
        Commands::Dataset { command } => commands::dataset::run(command),
        Commands::Stage(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
        Commands::Auth { command } => commands::auth::run(command),
    }
}
