//! Key ring of verification keys
//!
//! Thread-safe map of key id → public key. The client keeps the token
//! authority's keys here so role tokens can be verified locally; the authority
//! keeps its own signing key's public half here for self-verification.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::info;

use crate::crypto::PublicKey;

/// Public keys indexed by key id
#[derive(Debug, Default)]
pub struct KeyRing {
    keys: RwLock<HashMap<String, PublicKey>>,
}

impl KeyRing {
    /// Create an empty key ring
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key (builder pattern)
    pub fn with_key(self, key: PublicKey) -> Self {
        self.insert(key);
        self
    }

    /// Register a key under its own key id, replacing any previous key
    pub fn insert(&self, key: PublicKey) {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        info!(kid = %key.kid(), "Registered verification key");
        keys.insert(key.kid().to_string(), key);
    }

    /// Get a key by key id
    pub fn get(&self, kid: &str) -> Option<PublicKey> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.get(kid).cloned()
    }

    /// Check if a key id is registered
    pub fn contains(&self, kid: &str) -> bool {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.contains_key(kid)
    }

    /// Remove a key
    pub fn remove(&self, kid: &str) -> bool {
        let mut keys = self.keys.write().unwrap_or_else(PoisonError::into_inner);
        let removed = keys.remove(kid).is_some();
        if removed {
            info!(kid = %kid, "Removed verification key");
        }
        removed
    }

    /// List all registered key ids
    pub fn kids(&self) -> Vec<String> {
        let keys = self.keys.read().unwrap_or_else(PoisonError::into_inner);
        keys.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_insert_and_lookup() {
        let ring = KeyRing::new();
        let kp = KeyPair::generate("zts-0");

        ring.insert(kp.public_key());

        assert!(ring.contains("zts-0"));
        assert!(!ring.contains("zts-1"));
        assert_eq!(ring.get("zts-0"), Some(kp.public_key()));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_replace_key() {
        let first = KeyPair::generate("zts-0");
        let second = KeyPair::generate("zts-0");
        let ring = KeyRing::new().with_key(first.public_key());

        ring.insert(second.public_key());

        assert_eq!(ring.len(), 1);
        assert_eq!(ring.get("zts-0"), Some(second.public_key()));
    }

    #[test]
    fn test_remove() {
        let ring = KeyRing::new().with_key(KeyPair::generate("a").public_key());

        assert!(ring.remove("a"));
        assert!(!ring.remove("a"));
        assert!(ring.is_empty());
    }
}
