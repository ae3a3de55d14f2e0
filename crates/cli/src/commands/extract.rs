//! Extract Commands

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::debug;

use mailwatch_core::{NotificationClient, NotificationMessage};

use crate::output::{print_item, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ExtractArgs {
    /// JSON file holding a message, or the JSON output of `mailwatch wait`
    #[arg(short, long)]
    pub message: PathBuf,

    /// Link category, e.g. activation, login, gift
    #[arg(short, long)]
    pub category: String,

    /// Print only the embedded token
    #[arg(long)]
    pub token: bool,
}

#[derive(Serialize)]
struct ExtractedLink {
    category: String,
    link: String,
    token: Option<String>,
}

impl TableDisplay for ExtractedLink {
    fn headers() -> Vec<&'static str> {
        vec!["Category", "Link", "Token"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.category.clone(),
            self.link.clone(),
            self.token.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

/// Accepts a bare message or a `wait` result wrapping one under `message`
fn load_message(path: &Path) -> Result<NotificationMessage> {
    let content = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let mut value: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
    if let Some(inner) = value.get_mut("message") {
        value = inner.take();
    }
    serde_json::from_value(value).with_context(|| format!("{} does not hold a notification message", path.display()))
}

pub fn execute(args: ExtractArgs, client: &NotificationClient, format: OutputFormat) -> Result<()> {
    let message = load_message(&args.message)?;
    debug!(path = %args.message.display(), category = %args.category, "extracting from saved message");

    if args.token {
        println!("{}", client.extract_token(&message, &args.category)?);
        return Ok(());
    }

    let link = client.extract_link(&message, &args.category)?;
    let token = client.extract_token(&message, &args.category).ok();
    match format {
        OutputFormat::Plain => println!("{}", link),
        _ => print_item(
            &ExtractedLink {
                category: args.category,
                link,
                token,
            },
            format,
        )?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_wrapped_message() {
        let message = NotificationMessage::new("a@b.test", "Your login link", "body");
        let wrapped = serde_json::json!({ "template": "login", "message": message });

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", wrapped).unwrap();
        let loaded = load_message(file.path()).unwrap();
        assert_eq!(loaded, message);
    }
}
