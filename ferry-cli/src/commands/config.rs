//! `ferry config show` and `ferry config init`

use anyhow::{bail, Context as _, Result};
use clap::{Args, Subcommand};
use colored::Colorize;

use ferry_core::{config, TransferConfig};

use crate::context::home_dir;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective configuration as YAML.
    Show,

    /// Write a default config.yaml.
    Init(InitArgs),
}

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Replace an existing config.yaml.
    #[arg(long)]
    pub force: bool,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    let home = home_dir()?;
    match command {
        ConfigCommand::Show => {
            let path = config::config_path_at(&home);
            let loaded = config::load_at(&home)
                .with_context(|| format!("failed to load {}", path.display()))?;
            if !path.exists() {
                println!("# {} not found; showing defaults", path.display());
            }
            print!("{}", serde_yaml::to_string(&loaded)?);
        }
        ConfigCommand::Init(args) => {
            let path = config::config_path_at(&home);
            if path.exists() && !args.force {
                bail!(
                    "{} already exists; pass --force to overwrite",
                    path.display()
                );
            }
            let written = config::save_at(&home, &TransferConfig::default_at(&home))
                .context("failed to write config")?;
            println!("{} Wrote {}", "✓".green(), written.display());
        }
    }
    Ok(())
}
