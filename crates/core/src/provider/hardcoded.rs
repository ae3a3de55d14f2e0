//! Operator-supplied addresses for manual runs

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{info, warn};

use super::ProviderAdapter;
use crate::config::ProviderMode;
use crate::error::{Error, Result};
use crate::types::{NotificationMessage, Role, TestIdentity};

/// Hands out pre-configured addresses without any network call.
///
/// Nothing here can observe real delivery: `fetch_latest` only sees messages
/// handed in through [`supply_message`](Self::supply_message).
#[derive(Debug)]
pub struct HardcodedProvider {
    addresses: BTreeMap<Role, String>,
    issued: Mutex<HashMap<String, u32>>,
    supplied: DashMap<String, Vec<NotificationMessage>>,
}

impl HardcodedProvider {
    pub fn new(addresses: BTreeMap<Role, String>) -> Self {
        warn!(
            count = addresses.len(),
            "hardcoded mailbox mode: deliveries are not verified automatically"
        );
        Self {
            addresses,
            issued: Mutex::new(HashMap::new()),
            supplied: DashMap::new(),
        }
    }

    /// Configured address for `role`, falling back to the generic address and
    /// then to the first configured one
    fn base_address(&self, role: Role) -> Option<&str> {
        self.addresses
            .get(&role)
            .or_else(|| self.addresses.get(&Role::Generic))
            .or_else(|| self.addresses.values().next())
            .map(String::as_str)
    }

    /// Hand a message in for an address, e.g. pasted from a real inbox
    pub fn supply_message(&self, address: &str, message: NotificationMessage) {
        info!(address, subject = message.subject(), "out-of-band message supplied");
        self.supplied
            .entry(address.to_ascii_lowercase())
            .or_default()
            .push(message);
    }
}

/// `user@host` + 2 -> `user+2@host`
fn sub_address(address: &str, n: u32) -> String {
    match address.split_once('@') {
        Some((local, domain)) => format!("{}+{}@{}", local, n, domain),
        None => format!("{}+{}", address, n),
    }
}

#[async_trait]
impl ProviderAdapter for HardcodedProvider {
    fn mode(&self) -> ProviderMode {
        ProviderMode::Hardcoded
    }

    async fn create_inbox(&self, role: Role) -> Result<TestIdentity> {
        let base = self.base_address(role).ok_or_else(|| {
            Error::InvalidConfiguration("hardcoded mode has no configured addresses".into())
        })?;

        let address = {
            let mut issued = self.issued.lock();
            let count = issued.entry(base.to_string()).or_insert(0);
            let address = if *count == 0 {
                base.to_string()
            } else {
                sub_address(base, *count)
            };
            *count += 1;
            address
        };

        info!(%role, address = %address, "issued hardcoded address");
        Ok(TestIdentity::new(address, None, role))
    }

    async fn fetch_latest(
        &self,
        identity: &TestIdentity,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<NotificationMessage>> {
        Ok(self
            .supplied
            .get(&identity.address().to_ascii_lowercase())
            .and_then(|messages| messages.iter().rev().find(|m| m.is_since(since)).cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> HardcodedProvider {
        HardcodedProvider::new(BTreeMap::from([
            (Role::Purchaser, "ops.buyer@shop.test".to_string()),
            (Role::Recipient, "ops.gifts@shop.test".to_string()),
        ]))
    }

    #[tokio::test]
    async fn test_addresses_stay_unique() {
        let p = provider();
        let first = p.create_inbox(Role::Purchaser).await.unwrap();
        let second = p.create_inbox(Role::Purchaser).await.unwrap();
        let recipient = p.create_inbox(Role::Recipient).await.unwrap();
        assert_eq!(first.address(), "ops.buyer@shop.test");
        assert_eq!(second.address(), "ops.buyer+1@shop.test");
        assert_eq!(recipient.address(), "ops.gifts@shop.test");
        assert!(first.provider_inbox_id().is_none());
    }

    #[tokio::test]
    async fn test_generic_falls_back_to_first_address() {
        let p = provider();
        let generic = p.create_inbox(Role::Generic).await.unwrap();
        assert_eq!(generic.address(), "ops.buyer@shop.test");
        assert_eq!(generic.role(), Role::Generic);
    }

    #[tokio::test]
    async fn test_fetch_sees_only_supplied_messages() {
        let p = provider();
        let identity = p.create_inbox(Role::Recipient).await.unwrap();
        assert!(p.fetch_latest(&identity, None).await.unwrap().is_none());

        p.supply_message("OPS.GIFTS@shop.test", NotificationMessage::new("a", "b", "c"));
        let msg = p.fetch_latest(&identity, None).await.unwrap().unwrap();
        assert_eq!(msg.subject(), "b");
    }
}
