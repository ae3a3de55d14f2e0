//! Core data model: identities and received notifications

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Role a provisioned identity plays in a business workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Purchaser,
    Recipient,
    Generic,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Purchaser, Role::Recipient, Role::Generic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Purchaser => "purchaser",
            Role::Recipient => "recipient",
            Role::Generic => "generic",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "purchaser" | "giver" | "buyer" => Ok(Role::Purchaser),
            "recipient" | "receiver" => Ok(Role::Recipient),
            "generic" => Ok(Role::Generic),
            other => Err(Error::InvalidConfiguration(format!("unknown role '{}'", other))),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

/// A disposable, role-tagged mailbox address owned by one test run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestIdentity {
    address: String,
    provider_inbox_id: Option<String>,
    role: Role,
    created_at: DateTime<Utc>,
}

impl TestIdentity {
    pub fn new(address: impl Into<String>, provider_inbox_id: Option<String>, role: Role) -> Self {
        Self {
            address: address.into(),
            provider_inbox_id,
            role,
            created_at: Utc::now(),
        }
    }

    /// Same inbox, different role tag
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Override the provisioning timestamp (used when re-attaching to an existing inbox)
    pub fn created_at_time(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn provider_inbox_id(&self) -> Option<&str> {
        self.provider_inbox_id.as_deref()
    }

    /// Handle the provider uses to look the inbox up: the inbox id when the
    /// backend issued one, the address otherwise
    pub fn inbox_ref(&self) -> &str {
        self.provider_inbox_id.as_deref().unwrap_or(&self.address)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.role, self.address)
    }
}

/// Immutable record of a received transactional message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    subject: String,
    body: String,
    sender: String,
    #[serde(default)]
    recipients: Vec<String>,
    received_at: DateTime<Utc>,
    #[serde(default)]
    raw: serde_json::Value,
}

impl NotificationMessage {
    pub fn new(
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            sender: sender.into(),
            recipients: Vec::new(),
            received_at: Utc::now(),
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_recipients<I, S>(mut self, recipients: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recipients = recipients.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    pub fn with_raw(mut self, raw: serde_json::Value) -> Self {
        self.raw = raw;
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    /// Provider payload exactly as received
    pub fn raw(&self) -> &serde_json::Value {
        &self.raw
    }

    /// Whether the message was received at or after `since`
    pub fn is_since(&self, since: Option<DateTime<Utc>>) -> bool {
        since.map_or(true, |since| self.received_at >= since)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_role_parse_aliases() {
        assert_eq!("Giver".parse::<Role>().unwrap(), Role::Purchaser);
        assert_eq!("receiver".parse::<Role>().unwrap(), Role::Recipient);
        assert!("storyteller".parse::<Role>().is_err());
    }

    #[test]
    fn test_inbox_ref_prefers_provider_id() {
        let with_id = TestIdentity::new("a@x.test", Some("inbox-1".into()), Role::Generic);
        let without = TestIdentity::new("b@x.test", None, Role::Generic);
        assert_eq!(with_id.inbox_ref(), "inbox-1");
        assert_eq!(without.inbox_ref(), "b@x.test");
    }

    #[test]
    fn test_is_since() {
        let now = Utc::now();
        let msg = NotificationMessage::new("s", "subj", "body").with_received_at(now);
        assert!(msg.is_since(None));
        assert!(msg.is_since(Some(now)));
        assert!(msg.is_since(Some(now - Duration::seconds(5))));
        assert!(!msg.is_since(Some(now + Duration::seconds(5))));
    }

    #[test]
    fn test_message_json_shape() {
        let json = r#"{
            "subject": "Hi",
            "body": "Body",
            "sender": "Shop <noreply@shop.test>",
            "received_at": "2024-05-01T10:00:00Z"
        }"#;
        let msg: NotificationMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.sender(), "Shop <noreply@shop.test>");
        assert!(msg.recipients().is_empty());
        assert!(msg.raw().is_null());
    }
}
