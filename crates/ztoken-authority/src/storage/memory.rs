//! In-memory grant store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use super::{Grant, GrantStore, StorageError};

type GrantKey = (String, String, String);

fn grant_key(provider_domain: &str, role: &str, principal: &str) -> GrantKey {
    (
        provider_domain.to_string(),
        role.to_string(),
        principal.to_string(),
    )
}

/// Grants held in a hashmap keyed by `(provider domain, role, principal)`
#[derive(Debug, Default)]
pub struct MemoryGrantStore {
    grants: RwLock<HashMap<GrantKey, Grant>>,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GrantStore for MemoryGrantStore {
    async fn grant(&self, grant: Grant) -> Result<(), StorageError> {
        let mut grants = self.grants.write().unwrap_or_else(PoisonError::into_inner);
        info!(
            provider_domain = %grant.provider_domain,
            role = %grant.role,
            principal = %grant.principal,
            "Granted role"
        );
        grants.insert(
            grant_key(&grant.provider_domain, &grant.role, &grant.principal),
            grant,
        );
        Ok(())
    }

    async fn revoke(
        &self,
        provider_domain: &str,
        role: &str,
        principal: &str,
    ) -> Result<(), StorageError> {
        let mut grants = self.grants.write().unwrap_or_else(PoisonError::into_inner);
        match grants.remove(&grant_key(provider_domain, role, principal)) {
            Some(_) => {
                info!(
                    provider_domain = %provider_domain,
                    role = %role,
                    principal = %principal,
                    "Revoked role"
                );
                Ok(())
            }
            None => Err(StorageError::NotFound(format!(
                "{} in {}:{}",
                principal, provider_domain, role
            ))),
        }
    }

    async fn has_role(
        &self,
        provider_domain: &str,
        role: &str,
        principal: &str,
    ) -> Result<bool, StorageError> {
        let grants = self.grants.read().unwrap_or_else(PoisonError::into_inner);
        Ok(grants.contains_key(&grant_key(provider_domain, role, principal)))
    }

    async fn list(&self, provider_domain: &str) -> Result<Vec<Grant>, StorageError> {
        let grants = self.grants.read().unwrap_or_else(PoisonError::into_inner);
        Ok(grants
            .values()
            .filter(|g| g.provider_domain == provider_domain)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_and_check() {
        let store = MemoryGrantStore::new();
        store
            .grant(Grant::new("sports", "readers", "media.storage"))
            .await
            .unwrap();

        assert!(store.has_role("sports", "readers", "media.storage").await.unwrap());
        assert!(!store.has_role("sports", "writers", "media.storage").await.unwrap());
        assert!(!store.has_role("weather", "readers", "media.storage").await.unwrap());
        assert_eq!(store.list("sports").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_revoke() {
        let store = MemoryGrantStore::new();
        store
            .grant(Grant::new("sports", "readers", "media.storage"))
            .await
            .unwrap();

        store.revoke("sports", "readers", "media.storage").await.unwrap();
        assert!(!store.has_role("sports", "readers", "media.storage").await.unwrap());
        assert!(matches!(
            store.revoke("sports", "readers", "media.storage").await,
            Err(StorageError::NotFound(_))
        ));
    }
}
