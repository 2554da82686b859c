//! Key registry for the authority
//!
//! Holds:
//! - the authority's signing key for role tokens
//! - service public keys, indexed by `(domain, service, key id)`, used to
//!   verify principal credentials

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{info, warn};
use ztoken_core::{KeyPair, PublicKey};

/// Lookup key for a registered service public key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceKeyId {
    pub domain: String,
    pub service: String,
    pub key_id: String,
}

impl ServiceKeyId {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        key_id: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            key_id: key_id.into(),
        }
    }
}

impl std::fmt::Display for ServiceKeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}#{}", self.domain, self.service, self.key_id)
    }
}

/// Errors raised while registering service keys
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A different key is already registered under the same id
    #[error("A different key is already registered as {0}")]
    KeyConflict(ServiceKeyId),
}

/// Thread-safe key storage for the authority
pub struct KeyRegistry {
    /// Registered service keys
    service_keys: RwLock<HashMap<ServiceKeyId, PublicKey>>,

    /// Signs every issued role token
    signing_key: KeyPair,
}

impl KeyRegistry {
    /// Create a registry around the authority's signing key
    pub fn new(signing_key: KeyPair) -> Self {
        info!(kid = %signing_key.kid(), "Key registry initialized with authority key");

        Self {
            service_keys: RwLock::new(HashMap::new()),
            signing_key,
        }
    }

    /// Create a registry with a freshly generated signing key
    pub fn generate(kid: impl Into<String>) -> Self {
        Self::new(KeyPair::generate(kid))
    }

    pub fn authority_kid(&self) -> &str {
        self.signing_key.kid()
    }

    pub fn authority_public_key(&self) -> PublicKey {
        self.signing_key.public_key()
    }

    pub(crate) fn signing_key(&self) -> &KeyPair {
        &self.signing_key
    }

    // =========================================================================
    // Service Key Management
    // =========================================================================

    /// Register a service public key.
    ///
    /// Registering the same key twice is a no-op. A different key under an
    /// existing id is rejected; use `replace_service_key` to rotate it.
    pub fn register_service_key(
        &self,
        domain: impl Into<String>,
        service: impl Into<String>,
        key: PublicKey,
    ) -> Result<(), RegistryError> {
        let id = ServiceKeyId::new(domain, service, key.kid());
        let mut keys = self.service_keys.write().unwrap_or_else(PoisonError::into_inner);
        match keys.get(&id) {
            Some(existing) if *existing == key => Ok(()),
            Some(_) => {
                warn!(key = %id, "Refused to overwrite service key");
                Err(RegistryError::KeyConflict(id))
            }
            None => {
                info!(key = %id, "Registered service key");
                keys.insert(id, key);
                Ok(())
            }
        }
    }

    /// Register a service public key, replacing any key under the same id
    pub fn replace_service_key(
        &self,
        domain: impl Into<String>,
        service: impl Into<String>,
        key: PublicKey,
    ) {
        let id = ServiceKeyId::new(domain, service, key.kid());
        let mut keys = self.service_keys.write().unwrap_or_else(PoisonError::into_inner);
        if keys.insert(id.clone(), key).is_some() {
            info!(key = %id, "Replaced service key");
        } else {
            info!(key = %id, "Registered service key");
        }
    }

    /// Look up the key a principal credential must verify against
    pub fn service_key(&self, domain: &str, service: &str, key_id: &str) -> Option<PublicKey> {
        let keys = self.service_keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(&ServiceKeyId::new(domain, service, key_id)).cloned()
    }

    pub fn unregister_service_key(&self, id: &ServiceKeyId) -> bool {
        let mut keys = self.service_keys.write().unwrap_or_else(PoisonError::into_inner);
        let removed = keys.remove(id).is_some();
        if removed {
            info!(key = %id, "Unregistered service key");
        }
        removed
    }

    pub fn service_key_count(&self) -> usize {
        self.service_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
