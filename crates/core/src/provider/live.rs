//! Hosted mailbox HTTP backend
//!
//! Wire protocol (API key in the `x-api-key` header):
//!
//! ```text
//! POST /inboxes                                  -> { "id", "emailAddress" }
//! GET  /inboxes/{id}/emails?sort=DESC&size=1     -> [ { "id", "subject", "from", "createdAt" } ]
//!      [&since=<rfc3339>]
//! GET  /emails/{emailId}                         -> { "id", "subject", "body", "from", "to", "createdAt" }
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ProviderAdapter;
use crate::config::{ProviderConfig, ProviderMode};
use crate::error::{Error, Result};
use crate::types::{NotificationMessage, Role, TestIdentity};

const API_KEY_HEADER: &str = "x-api-key";

/// Inbox as returned by the hosted service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxRecord {
    pub id: String,
    pub email_address: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmailPreview {
    id: String,
}

/// Full message as returned by the hosted service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    pub id: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub raw: serde_json::Value,
}

impl From<EmailRecord> for NotificationMessage {
    fn from(record: EmailRecord) -> Self {
        NotificationMessage::new(
            record.from.unwrap_or_default(),
            record.subject.unwrap_or_default(),
            record.body.unwrap_or_default(),
        )
        .with_recipients(record.to)
        .with_received_at(record.created_at)
        .with_raw(record.raw)
    }
}

/// Requests against the hosted mailbox API
#[async_trait]
pub trait MailboxTransport: Send + Sync {
    async fn create_inbox(&self) -> Result<InboxRecord>;

    async fn latest_email(
        &self,
        inbox_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<EmailRecord>>;
}

/// `reqwest`-backed transport. The client is shared and pooled, so
/// concurrent polls on different inboxes reuse connections.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let creds = config.credentials.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration("live mode requires [provider.live] credentials".into())
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(creds.request_timeout_secs))
            .pool_max_idle_per_host(creds.max_idle_connections)
            .user_agent(concat!("mailwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("http client: {}", e)))?;
        Ok(Self {
            client,
            base_url: creds.base_url.trim_end_matches('/').to_string(),
            api_key: creds.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(Error::ProviderUnavailable(format!(
                "{}: authentication rejected ({})",
                what, status
            )));
        }
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        Err(Error::ProviderUnavailable(format!(
            "{}: HTTP {} {}",
            what, status, snippet
        )))
    }
}

#[async_trait]
impl MailboxTransport for HttpTransport {
    async fn create_inbox(&self) -> Result<InboxRecord> {
        let response = self
            .client
            .post(self.url("/inboxes"))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let response = Self::check(response, "create inbox").await?;
        Ok(response.json::<InboxRecord>().await?)
    }

    async fn latest_email(
        &self,
        inbox_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<EmailRecord>> {
        let mut query = vec![("sort", "DESC".to_string()), ("size", "1".to_string())];
        if let Some(since) = since {
            query.push(("since", since.to_rfc3339_opts(SecondsFormat::Millis, true)));
        }

        let response = self
            .client
            .get(self.url(&format!("/inboxes/{}/emails", inbox_id)))
            .header(API_KEY_HEADER, &self.api_key)
            .query(&query)
            .send()
            .await?;
        let previews: Vec<EmailPreview> = Self::check(response, "list emails").await?.json().await?;
        let Some(latest) = previews.into_iter().next() else {
            return Ok(None);
        };

        let response = self
            .client
            .get(self.url(&format!("/emails/{}", latest.id)))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;
        let raw: serde_json::Value = Self::check(response, "get email").await?.json().await?;
        let mut record: EmailRecord = serde_json::from_value(raw.clone())
            .map_err(|e| Error::ProviderUnavailable(format!("malformed email payload: {}", e)))?;
        record.raw = raw;
        Ok(Some(record))
    }
}

/// Backend talking to the hosted mailbox service
pub struct LiveProvider {
    transport: Arc<dyn MailboxTransport>,
}

impl LiveProvider {
    pub fn new(transport: Arc<dyn MailboxTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl ProviderAdapter for LiveProvider {
    fn mode(&self) -> ProviderMode {
        ProviderMode::Live
    }

    async fn create_inbox(&self, role: Role) -> Result<TestIdentity> {
        let inbox = self.transport.create_inbox().await?;
        if inbox.email_address.trim().is_empty() {
            return Err(Error::ProviderUnavailable(format!(
                "inbox {} was created without an address",
                inbox.id
            )));
        }
        info!(%role, inbox_id = %inbox.id, address = %inbox.email_address, "created live inbox");
        Ok(TestIdentity::new(inbox.email_address, Some(inbox.id), role))
    }

    async fn fetch_latest(
        &self,
        identity: &TestIdentity,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<NotificationMessage>> {
        let inbox_id = identity.provider_inbox_id().ok_or_else(|| {
            Error::ProviderUnavailable(format!(
                "{} has no provider inbox id; live inboxes must be provisioned through the provider",
                identity.address()
            ))
        })?;
        let record = self.transport.latest_email(inbox_id, since).await?;
        debug!(inbox_id, found = record.is_some(), "live fetch");
        Ok(record
            .map(NotificationMessage::from)
            .filter(|m| m.is_since(since)))
    }
}
