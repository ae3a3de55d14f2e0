//! Config check

use anyhow::Result;
use serde::Serialize;

use mailwatch_core::NotificationClient;

use crate::output::{print_item, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Serialize)]
struct ConfigSummary {
    mode: String,
    verifies_delivery: bool,
    live_endpoint: Option<String>,
    poll_interval_secs: f64,
    poll_timeout_secs: f64,
    max_retries: u32,
    strict: bool,
    link_domain: String,
    link_categories: Vec<String>,
    templates: usize,
}

impl TableDisplay for ConfigSummary {
    fn headers() -> Vec<&'static str> {
        vec!["Mode", "Verifies", "Endpoint", "Poll", "Strict", "Link domain", "Categories", "Templates"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.mode.clone(),
            self.verifies_delivery.to_string(),
            self.live_endpoint.clone().unwrap_or_else(|| "-".to_string()),
            format!(
                "every {}s for {}s, {} retries",
                self.poll_interval_secs, self.poll_timeout_secs, self.max_retries
            ),
            self.strict.to_string(),
            self.link_domain.clone(),
            self.link_categories.join(", "),
            self.templates.to_string(),
        ]
    }
}

pub fn execute(client: &NotificationClient, format: OutputFormat) -> Result<()> {
    let config = client.config();
    let summary = ConfigSummary {
        mode: client.mode().to_string(),
        verifies_delivery: client.supports_verification(),
        live_endpoint: config
            .provider
            .credentials
            .as_ref()
            .filter(|_| client.mode() == mailwatch_core::ProviderMode::Live)
            .map(|c| c.base_url.clone()),
        poll_interval_secs: config.poll.interval.as_secs_f64(),
        poll_timeout_secs: config.poll.timeout.as_secs_f64(),
        max_retries: config.poll.max_retries,
        strict: config.strict,
        link_domain: client.links().base_domain().to_string(),
        link_categories: client.links().categories().map(str::to_string).collect(),
        templates: client.templates().len(),
    };

    print_item(&summary, format)?;
    if !summary.verifies_delivery {
        print_warning("hardcoded mode cannot confirm delivery; use live or fake for automated runs");
    }
    print_success("configuration is valid");
    Ok(())
}
