//! Identity provisioning and per-run registry

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::error::{Error, Result};
use crate::provider::ProviderAdapter;
use crate::types::{Role, TestIdentity};

#[derive(Default)]
struct Registry {
    addresses: HashSet<String>,
    identities: Vec<TestIdentity>,
}

/// Requests inboxes from the active backend and remembers who is who
pub struct IdentityProvisioner {
    provider: Arc<dyn ProviderAdapter>,
    registry: Mutex<Registry>,
}

impl IdentityProvisioner {
    pub fn new(provider: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            provider,
            registry: Mutex::new(Registry::default()),
        }
    }

    /// Provision a fresh identity for `role`. Adapter failures surface as-is;
    /// there is no retry.
    pub async fn provision(&self, role: Role) -> Result<TestIdentity> {
        let identity = self.provider.create_inbox(role).await?.with_role(role);

        let key = identity.address().to_ascii_lowercase();
        {
            let mut registry = self.registry.lock();
            if !registry.addresses.insert(key) {
                return Err(Error::DuplicateIdentity(identity.address().to_string()));
            }
            registry.identities.push(identity.clone());
        }

        info!(
            %role,
            address = identity.address(),
            inbox_id = identity.provider_inbox_id().unwrap_or("-"),
            mode = %self.provider.mode(),
            "provisioned identity"
        );
        Ok(identity)
    }

    /// Most recently provisioned identity for `role`
    pub fn identity_for(&self, role: Role) -> Option<TestIdentity> {
        self.registry
            .lock()
            .identities
            .iter()
            .rev()
            .find(|i| i.role() == role)
            .cloned()
    }

    /// Identity owning `address`, if it was provisioned in this run
    pub fn find_by_address(&self, address: &str) -> Option<TestIdentity> {
        self.registry
            .lock()
            .identities
            .iter()
            .find(|i| i.address().eq_ignore_ascii_case(address))
            .cloned()
    }

    /// Every identity in provisioning order
    pub fn identities(&self) -> Vec<TestIdentity> {
        self.registry.lock().identities.clone()
    }
}
