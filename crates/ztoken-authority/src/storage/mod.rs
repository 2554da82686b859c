//! Grant storage
//!
//! A grant gives one principal (`domain.service`) one role in one provider
//! domain. The authority issues a role token only for granted roles.
//! `MemoryGrantStore` is the only backend; state is lost on restart.

pub mod memory;

pub use memory::MemoryGrantStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// Error type for storage operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Grant not found: {0}")]
    NotFound(String),
}

/// One role granted to one principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub provider_domain: String,
    pub role: String,
    /// `domain.service`
    pub principal: String,
    pub granted_at: DateTime<Utc>,
}

impl Grant {
    pub fn new(
        provider_domain: impl Into<String>,
        role: impl Into<String>,
        principal: impl Into<String>,
    ) -> Self {
        Self {
            provider_domain: provider_domain.into(),
            role: role.into(),
            principal: principal.into(),
            granted_at: Utc::now(),
        }
    }
}

/// Storage backend for grants
#[async_trait]
pub trait GrantStore: Send + Sync + Debug {
    /// Record a grant. Re-granting is a no-op apart from the timestamp.
    async fn grant(&self, grant: Grant) -> Result<(), StorageError>;

    /// Remove a grant
    async fn revoke(&self, provider_domain: &str, role: &str, principal: &str)
        -> Result<(), StorageError>;

    /// Whether `principal` holds `role` in `provider_domain`
    async fn has_role(
        &self,
        provider_domain: &str,
        role: &str,
        principal: &str,
    ) -> Result<bool, StorageError>;

    /// All grants in a provider domain
    async fn list(&self, provider_domain: &str) -> Result<Vec<Grant>, StorageError>;
}
