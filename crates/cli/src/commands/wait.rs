//! Wait Commands

use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::debug;

use mailwatch_core::{
    CancellationToken, NotificationClient, Placeholders, Role, TestIdentity, VerifiedNotification,
};

use crate::output::{print_item, print_structured, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct WaitArgs {
    /// Notification template name (see `mailwatch templates`)
    #[arg(short, long)]
    pub template: String,

    /// Existing address to watch; omit to provision a fresh one for --role
    #[arg(short, long)]
    pub address: Option<String>,

    /// Provider inbox id for --address (required in live mode)
    #[arg(long, requires = "address")]
    pub inbox_id: Option<String>,

    /// Role of the identity
    #[arg(short, long, default_value = "generic")]
    pub role: Role,

    /// Placeholder value, e.g. --set receiverFirstName=Jane
    #[arg(short = 's', long = "set", value_parser = parse_key_val)]
    pub values: Vec<(String, String)>,

    /// Override the configured timeout, in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Ignore messages received before this RFC 3339 instant (default: now)
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,
}

fn parse_key_val(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

#[derive(Serialize)]
struct WaitSummary<'a> {
    template: &'a str,
    address: &'a str,
    subject: &'a str,
    attempts: u32,
    elapsed_ms: u64,
    failures: usize,
}

impl TableDisplay for WaitSummary<'_> {
    fn headers() -> Vec<&'static str> {
        vec!["Template", "Address", "Subject", "Attempts", "Elapsed", "Validation"]
    }

    fn row(&self) -> Vec<String> {
        let validation = if self.failures == 0 {
            "ok".green().to_string()
        } else {
            format!("{} failure(s)", self.failures).red().to_string()
        };
        vec![
            self.template.to_string(),
            self.address.to_string(),
            self.subject.to_string(),
            self.attempts.to_string(),
            format!("{:.1}s", self.elapsed_ms as f64 / 1000.0),
            validation,
        ]
    }
}

impl<'a> From<&'a VerifiedNotification> for WaitSummary<'a> {
    fn from(v: &'a VerifiedNotification) -> Self {
        Self {
            template: &v.template,
            address: v.identity.address(),
            subject: v.message.subject(),
            attempts: v.attempts,
            elapsed_ms: v.elapsed_ms,
            failures: v.report.failures.len(),
        }
    }
}

async fn identity(args: &WaitArgs, client: &NotificationClient) -> Result<TestIdentity> {
    let identity = match &args.address {
        Some(address) => TestIdentity::new(address.clone(), args.inbox_id.clone(), args.role),
        None => {
            let identity = client.provision_identity(args.role).await?;
            eprintln!("Watching {}", identity.address().bold());
            identity
        }
    };
    Ok(match args.since {
        Some(since) => identity.created_at_time(since),
        None => identity,
    })
}

pub async fn execute(args: WaitArgs, client: &NotificationClient, format: OutputFormat) -> Result<()> {
    if !client.supports_verification() {
        print_warning("hardcoded mode: a match only reflects messages supplied by hand");
    }

    let template = client.template(&args.template)?.clone();
    let values: Placeholders = args.values.iter().cloned().collect();
    let timeout = match args.timeout {
        Some(secs) => Some(
            Duration::try_from_secs_f64(secs).with_context(|| format!("invalid --timeout {}", secs))?,
        ),
        None => None,
    };
    if timeout.is_some_and(|t| t.is_zero()) {
        bail!("--timeout must be positive");
    }
    let identity = identity(&args, client).await?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("waiting for '{}' at {}", template.name, identity.address()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let result = client
        .wait_for_notification_with_cancel(&identity, &template, &values, timeout, &cancel)
        .await;
    interrupt.abort();
    spinner.finish_and_clear();

    let verified = result?;
    debug!(attempts = verified.attempts, elapsed_ms = verified.elapsed_ms, "notification matched");
    match format {
        OutputFormat::Json | OutputFormat::Yaml => print_structured(&verified, format)?,
        _ => {
            print_item(&WaitSummary::from(&verified), format)?;
            if verified.report.is_ok() {
                print_success(&format!("'{}' delivered to {}", verified.template, identity.address()));
            } else {
                print_warning(&verified.report.to_string());
            }
        }
    }
    if !verified.report.is_ok() {
        bail!(
            "'{}' delivered to {} but failed {} check(s)",
            verified.template,
            identity.address(),
            verified.report.failures.len()
        );
    }
    Ok(())
}
