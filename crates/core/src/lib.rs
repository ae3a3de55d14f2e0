//! Mailwatch: notification verification for end-to-end suites
//!
//! Business workflows driven through a browser (ordering, gifting, account
//! settings) send transactional emails. This crate provisions disposable
//! inboxes for the participants, waits for those emails with a bounded,
//! cancellable poll, validates them against an expected template and pulls
//! out the action links the workflow continues with.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ NotificationClient                                           │
//! │   ├── provision_identity(role)      -> TestIdentity          │
//! │   ├── wait_for_notification(id, template, values, timeout?)  │
//! │   │        -> VerifiedNotification                           │
//! │   └── extract_link(message, category) -> String              │
//! ├──────────────────────────────────────────────────────────────┤
//! │ IdentityProvisioner   NotificationPoller   ContentValidator  │
//! │                                            LinkExtractor     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ ProviderAdapter: Live (HTTP) | Fake (memory) | Hardcoded     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod links;
pub mod poller;
pub mod provider;
pub mod seed;
pub mod template;
pub mod types;
pub mod validator;

pub use client::{NotificationClient, VerifiedNotification, WaitRequest};
pub use config::{ClientConfig, ConfigFile, LiveCredentials, PollPolicy, ProviderConfig, ProviderMode};
pub use error::{Error, Result};
pub use links::{LinkExtractor, LinkRuleSpec, LinkSettings};
pub use poller::PollState;
pub use provider::{FakeScenario, MailboxTransport};
pub use seed::PersonSeed;
pub use template::{AddressRule, ExpectedTemplate, Placeholders, TemplateCatalog};
pub use tokio_util::sync::CancellationToken;
pub use types::{NotificationMessage, Role, TestIdentity};
pub use validator::{CheckFailure, CheckKind, ValidationReport};
