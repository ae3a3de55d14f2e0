//! Provision Commands

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::debug;

use mailwatch_core::{NotificationClient, Role, TestIdentity};

use crate::output::{print_list, print_warning, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ProvisionArgs {
    /// Role the identities play (purchaser, recipient, generic)
    #[arg(short, long, default_value = "generic")]
    pub role: Role,

    /// Number of identities to create
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,
}

#[derive(Serialize)]
pub struct IdentityDisplay {
    pub address: String,
    pub inbox_id: Option<String>,
    pub role: Role,
    pub created_at: String,
}

impl From<&TestIdentity> for IdentityDisplay {
    fn from(identity: &TestIdentity) -> Self {
        Self {
            address: identity.address().to_string(),
            inbox_id: identity.provider_inbox_id().map(str::to_string),
            role: identity.role(),
            created_at: identity.created_at().to_rfc3339(),
        }
    }
}

impl TableDisplay for IdentityDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Address", "Inbox ID", "Role", "Created"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.address.clone(),
            self.inbox_id.clone().unwrap_or_else(|| "-".to_string()),
            self.role.to_string(),
            self.created_at.clone(),
        ]
    }
}

pub async fn execute(args: ProvisionArgs, client: &NotificationClient, format: OutputFormat) -> Result<()> {
    if !client.supports_verification() {
        print_warning("hardcoded mode: these addresses cannot be checked for delivery automatically");
    }

    let mut identities = Vec::with_capacity(args.count);
    for _ in 0..args.count {
        let identity = client.provision_identity(args.role).await?;
        debug!(address = identity.address(), role = %identity.role(), "provisioned");
        identities.push(IdentityDisplay::from(&identity));
    }
    print_list(&identities, format)
}
