//! Mailwatch CLI - Main Entry Point
//!
//! Provisions test inboxes, waits for transactional notifications and pulls
//! action links out of them, for operators and scripted end-to-end runs.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mailwatch_core::{ClientConfig, ConfigFile, LiveCredentials, NotificationClient, ProviderMode};
use tracing::debug;

mod commands;
mod output;

use commands::{check_config, extract, provision, templates, wait};

/// Mailwatch - notification verification for end-to-end suites
#[derive(Parser)]
#[command(name = "mailwatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// TOML config file
    #[arg(long, env = "MAILWATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override the provider mode from the config file
    #[arg(long, global = true)]
    mode: Option<ProviderMode>,

    /// API key for live mode
    #[arg(long, env = "MAILWATCH_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision disposable identities
    Provision(provision::ProvisionArgs),

    /// Wait for a notification and validate it
    Wait(wait::WaitArgs),

    /// Extract a link from a saved message
    Extract(extract::ExtractArgs),

    /// List the notification template catalog
    Templates,

    /// Validate configuration and print the resolved settings
    CheckConfig,
}

impl Cli {
    /// Config file (or defaults) with command-line overrides applied
    fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut file = match &self.config {
            Some(path) => {
                debug!(path = %path.display(), "loading config");
                ConfigFile::load(path).with_context(|| format!("reading config {}", path.display()))?
            }
            None => {
                debug!("no config file, using defaults");
                ConfigFile::default()
            }
        };

        if let Some(mode) = self.mode {
            debug!(%mode, "provider mode overridden");
            file.provider.mode = mode;
        }
        if let Some(key) = &self.api_key {
            match file.provider.credentials.as_mut() {
                Some(creds) => creds.api_key = key.clone(),
                None => file.provider.credentials = Some(LiveCredentials::new(key.clone())),
            }
        }

        Ok(ClientConfig::try_from(file)?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let client = match cli.client_config().and_then(|c| Ok(NotificationClient::new(c)?)) {
        Ok(client) => {
            debug!(mode = %client.mode(), strict = client.config().strict, "client ready");
            client
        }
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            std::process::exit(2);
        }
    };

    match cli.command {
        Commands::Provision(args) => provision::execute(args, &client, cli.format).await?,
        Commands::Wait(args) => wait::execute(args, &client, cli.format).await?,
        Commands::Extract(args) => extract::execute(args, &client, cli.format)?,
        Commands::Templates => templates::execute(&client, cli.format)?,
        Commands::CheckConfig => check_config::execute(&client, cli.format)?,
    }

    Ok(())
}
