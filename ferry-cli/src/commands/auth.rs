//! `ferry auth status` and `ferry auth login`

use anyhow::{bail, Context as _, Result};
use chrono::{Duration, Utc};
use clap::{Args, Subcommand};
use colored::Colorize;

use ferry_auth::{ChainProvider, Credential, FileProvider, Provider};

use crate::context::home_dir;

#[derive(Subcommand, Debug)]
pub enum AuthCommand {
    /// Show which credential provider answers, without printing the token.
    Status,

    /// Store a token in ~/.ferry/token.yaml.
    Login(LoginArgs),
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Bearer token to store.
    #[arg(long)]
    pub token: String,

    /// Seconds until the token expires. Never expires when omitted.
    #[arg(long, value_name = "SECS")]
    pub expires_in: Option<i64>,
}

pub fn run(command: AuthCommand) -> Result<()> {
    let home = home_dir()?;
    match command {
        AuthCommand::Status => {
            let chain = ChainProvider::default_chain_at(&home);
            let credential = chain
                .retrieve()
                .context("no usable credentials; run `ferry auth login` or set FERRY_TOKEN")?;
            let provider = chain.current_name().unwrap_or("unknown");
            let expiry = match credential.expires_at {
                Some(at) => at.to_rfc3339(),
                None => "never".to_string(),
            };
            println!(
                "{} Authenticated via {} provider (expires: {})",
                "✓".green(),
                provider.bold(),
                expiry
            );
        }
        AuthCommand::Login(args) => {
            if args.token.trim().is_empty() {
                bail!("token must not be empty");
            }
            let expires_at = args.expires_in.map(|secs| Utc::now() + Duration::seconds(secs));
            let file = FileProvider::at_home(&home);
            file.store(&Credential::new(args.token, expires_at))
                .with_context(|| format!("failed to write {}", file.path().display()))?;
            println!("{} Stored token in {}", "✓".green(), file.path().display());
        }
    }
    Ok(())
}
