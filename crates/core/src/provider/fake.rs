//! Deterministic in-memory backend

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::ProviderAdapter;
use crate::config::{FakeSettings, ProviderMode};
use crate::error::{Error, Result};
use crate::template::{render, Placeholders};
use crate::types::{NotificationMessage, Role, TestIdentity};

/// A canned notification, rendered per inbox.
///
/// `{address}` is always available as a placeholder and resolves to the
/// receiving inbox's address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeScenario {
    pub name: String,

    /// Inboxes created for this role receive the message automatically
    #[serde(default)]
    pub role: Option<Role>,

    pub sender: String,
    pub subject: String,

    #[serde(default)]
    pub body: String,

    #[serde(default)]
    pub placeholders: Placeholders,
}

impl FakeScenario {
    pub fn new(
        name: impl Into<String>,
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            role: None,
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
            placeholders: Placeholders::new(),
        }
    }

    pub fn for_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_placeholders(mut self, placeholders: Placeholders) -> Self {
        self.placeholders = placeholders;
        self
    }

    /// Render the message as delivered to `identity`
    pub fn render_for(&self, identity: &TestIdentity) -> Result<NotificationMessage> {
        let values = self
            .placeholders
            .clone()
            .with("address", identity.address());
        let raw = serde_json::json!({ "scenario": self.name });
        Ok(NotificationMessage::new(
            render(&self.sender, &values)?,
            render(&self.subject, &values)?,
            render(&self.body, &values)?,
        )
        .with_recipients([identity.address()])
        .with_raw(raw))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Every `*.yaml` / `*.yml` file under `dir`, one scenario per file
    pub fn load_all(dir: &Path) -> Result<Vec<Self>> {
        let mut scenarios = Vec::new();
        for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                Error::InvalidConfiguration(format!("reading scenarios under {}: {}", dir.display(), e))
            })?;
            let is_yaml = entry
                .path()
                .extension()
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false);
            if !is_yaml {
                continue;
            }
            let content = std::fs::read_to_string(entry.path())?;
            scenarios.push(Self::from_yaml(&content)?);
        }
        Ok(scenarios)
    }
}

/// In-memory inboxes. Addresses are `<role>-<n>@<domain>` from a counter.
#[derive(Debug)]
pub struct FakeProvider {
    domain: String,
    counter: AtomicU64,
    /// Keyed by target role; `None` holds scenarios only delivered by name
    scenarios: DashMap<Option<Role>, Vec<FakeScenario>>,
    mailboxes: DashMap<String, Vec<NotificationMessage>>,
    fetches: AtomicU64,
}

impl FakeProvider {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            counter: AtomicU64::new(0),
            scenarios: DashMap::new(),
            mailboxes: DashMap::new(),
            fetches: AtomicU64::new(0),
        }
    }

    pub fn from_settings(settings: &FakeSettings) -> Result<Self> {
        let provider = Self::new(settings.domain.trim());
        if let Some(dir) = &settings.scenarios_dir {
            if !dir.is_dir() {
                return Err(Error::InvalidConfiguration(format!(
                    "fake scenarios_dir {} is not a directory",
                    dir.display()
                )));
            }
            for scenario in FakeScenario::load_all(dir)? {
                provider.register_scenario(scenario);
            }
        }
        Ok(provider)
    }

    /// Register a scenario. Scenarios with a role are delivered to every inbox
    /// created for that role from now on; role-less scenarios are only
    /// delivered through [`deliver_scenario`](Self::deliver_scenario).
    pub fn register_scenario(&self, scenario: FakeScenario) {
        info!(scenario = %scenario.name, role = ?scenario.role, "registered fake scenario");
        self.scenarios.entry(scenario.role).or_default().push(scenario);
    }

    /// Render a registered scenario by name into `identity`'s inbox
    pub fn deliver_scenario(&self, identity: &TestIdentity, name: &str) -> Result<NotificationMessage> {
        let scenario = self
            .scenarios
            .iter()
            .find_map(|entry| entry.value().iter().find(|s| s.name == name).cloned())
            .ok_or_else(|| Error::InvalidConfiguration(format!("no fake scenario named '{}'", name)))?;
        let message = scenario.render_for(identity)?;
        self.deliver(identity, message.clone());
        Ok(message)
    }

    /// Put a message straight into an inbox
    pub fn deliver(&self, identity: &TestIdentity, message: NotificationMessage) {
        debug!(address = identity.address(), subject = message.subject(), "fake delivery");
        self.mailboxes
            .entry(identity.address().to_string())
            .or_default()
            .push(message);
    }

    /// Number of `fetch_latest` calls served so far
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn message_count(&self, identity: &TestIdentity) -> usize {
        self.mailboxes
            .get(identity.address())
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl ProviderAdapter for FakeProvider {
    fn mode(&self) -> ProviderMode {
        ProviderMode::Fake
    }

    async fn create_inbox(&self, role: Role) -> Result<TestIdentity> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let address = format!("{}-{}@{}", role, n, self.domain);
        let identity = TestIdentity::new(address, Some(format!("fake-inbox-{}", n)), role);
        self.mailboxes.entry(identity.address().to_string()).or_default();

        let scenarios: Vec<FakeScenario> = self
            .scenarios
            .get(&Some(role))
            .map(|s| s.value().clone())
            .unwrap_or_default();
        for scenario in &scenarios {
            let message = scenario.render_for(&identity)?;
            self.deliver(&identity, message);
        }

        Ok(identity)
    }

    async fn fetch_latest(
        &self,
        identity: &TestIdentity,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<NotificationMessage>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.mailboxes.get(identity.address()).and_then(|messages| {
            messages
                .iter()
                .rev()
                .find(|m| m.is_since(since))
                .cloned()
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gift_scenario() -> FakeScenario {
        FakeScenario::new(
            "gift-receive",
            "Storybook <gifts@app.example.com>",
            "A special gift for {receiverFirstName}, from {giverFirstName}",
            "Hi {receiverFirstName}, open https://app.example.com/gift/g-1 (sent to {address})",
        )
        .for_role(Role::Recipient)
        .with_placeholders(
            Placeholders::new()
                .with("receiverFirstName", "Jane")
                .with("giverFirstName", "John"),
        )
    }

    #[tokio::test]
    async fn test_addresses_are_deterministic() {
        let fake = FakeProvider::new("fake.test");
        let a = fake.create_inbox(Role::Purchaser).await.unwrap();
        let b = fake.create_inbox(Role::Recipient).await.unwrap();
        assert_eq!(a.address(), "purchaser-1@fake.test");
        assert_eq!(b.address(), "recipient-2@fake.test");
        assert_eq!(b.provider_inbox_id(), Some("fake-inbox-2"));
    }

    #[tokio::test]
    async fn test_role_scenario_delivered_on_create() {
        let fake = FakeProvider::new("fake.test");
        fake.register_scenario(gift_scenario());

        let recipient = fake.create_inbox(Role::Recipient).await.unwrap();
        let purchaser = fake.create_inbox(Role::Purchaser).await.unwrap();

        let msg = fake.fetch_latest(&recipient, None).await.unwrap().unwrap();
        assert_eq!(msg.subject(), "A special gift for Jane, from John");
        assert!(msg.body().ends_with("(sent to recipient-1@fake.test)"));
        assert_eq!(msg.recipients(), ["recipient-1@fake.test".to_string()]);
        assert!(fake.fetch_latest(&purchaser, None).await.unwrap().is_none());
        assert_eq!(fake.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_fetch_respects_since() {
        let fake = FakeProvider::new("fake.test");
        let identity = fake.create_inbox(Role::Generic).await.unwrap();
        let old = NotificationMessage::new("a", "old", "")
            .with_received_at(Utc::now() - chrono::Duration::minutes(5));
        fake.deliver(&identity, old);
        assert!(fake
            .fetch_latest(&identity, Some(Utc::now() - chrono::Duration::minutes(1)))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_deliver_named_scenario() {
        let fake = FakeProvider::new("fake.test");
        fake.register_scenario(FakeScenario::new("login", "auth@app.example.com", "Your login link", ""));
        let identity = fake.create_inbox(Role::Purchaser).await.unwrap();
        assert_eq!(fake.message_count(&identity), 0);
        fake.deliver_scenario(&identity, "login").unwrap();
        assert_eq!(fake.message_count(&identity), 1);
        assert!(fake.deliver_scenario(&identity, "missing").is_err());
    }

    #[tokio::test]
    async fn test_roleless_scenario_not_auto_delivered() {
        let fake = FakeProvider::new("fake.test");
        fake.register_scenario(FakeScenario::new("login", "auth@app.example.com", "Your login link", ""));

        let generic = fake.create_inbox(Role::Generic).await.unwrap();
        assert_eq!(fake.message_count(&generic), 0);
        assert!(fake.fetch_latest(&generic, None).await.unwrap().is_none());

        fake.deliver_scenario(&generic, "login").unwrap();
        assert_eq!(fake.message_count(&generic), 1);
    }

    #[tokio::test]
    async fn test_generic_scenario_delivered_to_generic_only() {
        let fake = FakeProvider::new("fake.test");
        fake.register_scenario(
            FakeScenario::new("digest", "news@app.example.com", "Weekly digest", "").for_role(Role::Generic),
        );
        let generic = fake.create_inbox(Role::Generic).await.unwrap();
        let purchaser = fake.create_inbox(Role::Purchaser).await.unwrap();
        assert_eq!(fake.message_count(&generic), 1);
        assert_eq!(fake.message_count(&purchaser), 0);
    }

    #[test]
    fn test_load_scenarios_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("welcome.yaml"),
            "name: welcome\nrole: purchaser\nsender: hello@app.example.com\nsubject: \"Welcome, {firstName}!\"\nplaceholders:\n  firstName: Ada\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scenarios = FakeScenario::load_all(dir.path()).unwrap();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].role, Some(Role::Purchaser));
        assert_eq!(scenarios[0].placeholders.get("firstName"), Some("Ada"));
    }

    #[test]
    fn test_unreadable_scenarios_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(matches!(
            FakeScenario::load_all(&missing),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
