//! Template Commands

use anyhow::Result;
use serde::Serialize;

use mailwatch_core::template::placeholder_names;
use mailwatch_core::{ExpectedTemplate, NotificationClient};

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Serialize)]
struct TemplateDisplay<'a> {
    #[serde(flatten)]
    template: &'a ExpectedTemplate,
    placeholders: Vec<String>,
}

impl TableDisplay for TemplateDisplay<'_> {
    fn headers() -> Vec<&'static str> {
        vec!["Name", "Subject", "Placeholders", "Links", "Sender"]
    }

    fn row(&self) -> Vec<String> {
        let t = self.template;
        let subject = if t.subject_is_regex {
            format!("/{}/", t.subject_pattern)
        } else {
            t.subject_pattern.clone()
        };
        let links: Vec<&str> = t.required_link_categories.iter().map(String::as_str).collect();
        vec![
            t.name.clone(),
            subject,
            self.placeholders.join(", "),
            links.join(", "),
            t.expected_sender.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }
}

pub fn execute(client: &NotificationClient, format: OutputFormat) -> Result<()> {
    let rows: Vec<TemplateDisplay> = client
        .templates()
        .iter()
        .map(|template| TemplateDisplay {
            placeholders: placeholder_names(&template.subject_pattern),
            template,
        })
        .collect();
    print_list(&rows, format)
}
