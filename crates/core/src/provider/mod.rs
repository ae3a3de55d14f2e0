//! Mailbox backends
//!
//! Three interchangeable strategies behind one [`ProviderAdapter`] seam:
//! - [`LiveProvider`]: hosted mailbox HTTP API
//! - [`FakeProvider`]: deterministic in-memory inboxes with canned messages
//! - [`HardcodedProvider`]: operator-supplied addresses, no network
//!
//! The backend is chosen once from [`ProviderConfig`] and never re-checked
//! per call.

mod fake;
mod hardcoded;
mod live;

pub use fake::{FakeProvider, FakeScenario};
pub use hardcoded::HardcodedProvider;
pub use live::{EmailRecord, HttpTransport, InboxRecord, LiveProvider, MailboxTransport};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{ProviderConfig, ProviderMode};
use crate::error::Result;
use crate::types::{NotificationMessage, Role, TestIdentity};

/// Inbox creation and single-shot message lookup
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn mode(&self) -> ProviderMode;

    /// Create (or hand out) a mailbox for `role`
    async fn create_inbox(&self, role: Role) -> Result<TestIdentity>;

    /// Most recent message received at or after `since`, if any. Never waits;
    /// polling cadence belongs to the caller.
    async fn fetch_latest(
        &self,
        identity: &TestIdentity,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<NotificationMessage>>;
}

/// The closed set of backends
pub enum Provider {
    Live(LiveProvider),
    Fake(FakeProvider),
    Hardcoded(HardcodedProvider),
}

impl Provider {
    /// Build the backend selected by a validated config
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;
        match config.mode {
            ProviderMode::Live => {
                let transport = HttpTransport::from_config(config)?;
                Self::live_with_transport(Arc::new(transport))
            }
            ProviderMode::Fake => Ok(Provider::Fake(FakeProvider::from_settings(&config.fake)?)),
            ProviderMode::Hardcoded => Ok(Provider::Hardcoded(HardcodedProvider::new(
                config.hardcoded_addresses.clone(),
            ))),
        }
    }

    /// Live backend over an injected transport
    pub fn live_with_transport(transport: Arc<dyn MailboxTransport>) -> Result<Self> {
        Ok(Provider::Live(LiveProvider::new(transport)))
    }

    pub fn as_fake(&self) -> Option<&FakeProvider> {
        match self {
            Provider::Fake(fake) => Some(fake),
            _ => None,
        }
    }

    pub fn as_hardcoded(&self) -> Option<&HardcodedProvider> {
        match self {
            Provider::Hardcoded(hardcoded) => Some(hardcoded),
            _ => None,
        }
    }
}

#[async_trait]
impl ProviderAdapter for Provider {
    fn mode(&self) -> ProviderMode {
        match self {
            Provider::Live(p) => p.mode(),
            Provider::Fake(p) => p.mode(),
            Provider::Hardcoded(p) => p.mode(),
        }
    }

    async fn create_inbox(&self, role: Role) -> Result<TestIdentity> {
        match self {
            Provider::Live(p) => p.create_inbox(role).await,
            Provider::Fake(p) => p.create_inbox(role).await,
            Provider::Hardcoded(p) => p.create_inbox(role).await,
        }
    }

    async fn fetch_latest(
        &self,
        identity: &TestIdentity,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<NotificationMessage>> {
        match self {
            Provider::Live(p) => p.fetch_latest(identity, since).await,
            Provider::Fake(p) => p.fetch_latest(identity, since).await,
            Provider::Hardcoded(p) => p.fetch_latest(identity, since).await,
        }
    }
}
