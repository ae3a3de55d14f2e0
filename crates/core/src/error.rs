//! Error types for notification verification

use std::time::Duration;

use thiserror::Error;

use crate::validator::ValidationReport;

/// Result type alias using the mailwatch [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Mailwatch error types
#[derive(Error, Debug)]
pub enum Error {
    /// Bad mode/credential combination; raised before any test runs
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Network or auth failure talking to the hosted mailbox service
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error(
        "Timeout waiting for {matcher} at {address} after {elapsed:?} ({attempts} poll attempt(s))"
    )]
    Timeout {
        address: String,
        matcher: String,
        elapsed: Duration,
        attempts: u32,
    },

    #[error("Wait for {matcher} at {address} cancelled after {elapsed:?}")]
    Cancelled {
        address: String,
        matcher: String,
        elapsed: Duration,
    },

    #[error("Content mismatch for '{template}' at {address}:\n{report}")]
    ContentMismatch {
        template: String,
        address: String,
        report: ValidationReport,
    },

    #[error("No '{category}' link found (subject: {subject:?}, body: {body:?})")]
    LinkNotFound {
        category: String,
        subject: String,
        body: String,
    },

    #[error("Address {0} was already provisioned in this run")]
    DuplicateIdentity(String),

    #[error("Unknown notification template: {0}")]
    UnknownTemplate(String),

    #[error("No link rule configured for category '{0}'")]
    UnknownLinkCategory(String),

    #[error("Template '{pattern}' references placeholder {{{name}}} but no value was supplied")]
    MissingPlaceholder { pattern: String, name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::ProviderUnavailable(e.to_string())
    }
}

impl Error {
    /// Whether this error aborts the run rather than a single flow
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvalidConfiguration(_))
    }
}
