//! Content validation of a received notification against its template

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::links::LinkExtractor;
use crate::template::{render, ExpectedTemplate, Placeholders};
use crate::types::NotificationMessage;

/// Which part of the message a check looked at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "category", rename_all = "snake_case")]
pub enum CheckKind {
    Sender,
    Subject,
    Recipient,
    Link(String),
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckKind::Sender => f.write_str("sender"),
            CheckKind::Subject => f.write_str("subject"),
            CheckKind::Recipient => f.write_str("recipient"),
            CheckKind::Link(category) => write!(f, "link[{}]", category),
        }
    }
}

/// One failed check with both sides of the diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub check: CheckKind,
    pub expected: String,
    pub actual: String,
}

/// Every failed check for one message, not just the first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub template: String,
    pub failures: Vec<CheckFailure>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, check: &CheckKind) -> bool {
        self.failures.iter().any(|f| &f.check == check)
    }

    /// Turn a failing report into [`Error::ContentMismatch`]
    pub fn into_result(self, address: &str) -> Result<ValidationReport> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(Error::ContentMismatch {
                template: self.template.clone(),
                address: address.to_string(),
                report: self,
            })
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            return write!(f, "{}: all checks passed", self.template);
        }
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "  {}: expected {:?}, got {:?}",
                failure.check, failure.expected, failure.actual
            )?;
        }
        Ok(())
    }
}

/// Checks sender, subject, recipients and required links
#[derive(Debug, Clone)]
pub struct ContentValidator {
    links: Arc<LinkExtractor>,
}

impl ContentValidator {
    pub fn new(links: Arc<LinkExtractor>) -> Self {
        Self { links }
    }

    /// Run every check. Only template/configuration problems are errors;
    /// content differences land in the report.
    pub fn validate(
        &self,
        message: &NotificationMessage,
        template: &ExpectedTemplate,
        values: &Placeholders,
    ) -> Result<ValidationReport> {
        let mut failures = Vec::new();

        if let Some(expected_sender) = &template.expected_sender {
            let expected = render(expected_sender, values)?;
            let actual = message.sender();
            if !actual
                .to_ascii_lowercase()
                .contains(&expected.trim().to_ascii_lowercase())
            {
                failures.push(CheckFailure {
                    check: CheckKind::Sender,
                    expected,
                    actual: actual.to_string(),
                });
            }
        }

        let subject = template.subject_matcher(values)?;
        if !subject.matches(message.subject()) {
            failures.push(CheckFailure {
                check: CheckKind::Subject,
                expected: subject.to_string(),
                actual: message.subject().to_string(),
            });
        }

        if let Some(rule) = &template.recipient {
            let rule = rule.render(values)?;
            if !message.recipients().iter().any(|r| rule.matches(r)) {
                failures.push(CheckFailure {
                    check: CheckKind::Recipient,
                    expected: rule.to_string(),
                    actual: message.recipients().join(", "),
                });
            }
        }

        for category in &template.required_link_categories {
            if !self.links.contains(message, category)? {
                failures.push(CheckFailure {
                    check: CheckKind::Link(category.clone()),
                    expected: format!("a {} link on {}", category, self.links.base_domain()),
                    actual: "no match".to_string(),
                });
            }
        }

        Ok(ValidationReport {
            template: template.name.clone(),
            failures,
        })
    }

    /// [`validate`](Self::validate), failing with [`Error::ContentMismatch`]
    /// when any check fails
    pub fn validate_strict(
        &self,
        message: &NotificationMessage,
        template: &ExpectedTemplate,
        values: &Placeholders,
        address: &str,
    ) -> Result<ValidationReport> {
        self.validate(message, template, values)?.into_result(address)
    }
}
