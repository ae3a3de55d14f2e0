//! Role-tagged person seeds used to fill template placeholders

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Role, TestIdentity};

const FIRST_NAMES: &[&str] = &[
    "Jane", "John", "Amara", "Luis", "Mei", "Noah", "Priya", "Olga", "Tomas", "Zoe",
];

const LAST_NAMES: &[&str] = &[
    "Doe", "Okafor", "Garcia", "Chen", "Smith", "Patel", "Ivanova", "Novak", "Brown", "Kim",
];

/// Name and email for one participant in a workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonSeed {
    pub role: Role,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl PersonSeed {
    pub fn new(
        role: Role,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            role,
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
        }
    }

    /// Random names attached to a provisioned identity's address
    pub fn random_for(identity: &TestIdentity) -> Self {
        Self::random_with(&mut rand::thread_rng(), identity)
    }

    pub fn random_with<R: Rng + ?Sized>(rng: &mut R, identity: &TestIdentity) -> Self {
        let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Jane");
        let last = LAST_NAMES.choose(rng).copied().unwrap_or("Doe");
        Self::new(identity.role(), first, last, identity.address())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
