//! Service identity
//!
//! An `IdentityProvider` produces principal credentials for one
//! `(domain, service)` pair. `SimpleIdentityProvider` signs them locally with
//! the service's private key.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use ztoken_core::{
    KeyPair, PrincipalCredential, SigningError, DEFAULT_PRINCIPAL_LIFETIME_SECS,
};

/// Source of principal credentials for a single service
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Domain the service belongs to
    fn domain(&self) -> &str;

    /// Service name within the domain
    fn service(&self) -> &str;

    /// A currently valid principal credential
    async fn principal_credential(&self) -> Result<PrincipalCredential, SigningError>;
}

/// Identity backed by a local private key
///
/// Reuses the last credential it signed until less than a tenth of its
/// lifetime remains.
#[derive(Debug)]
pub struct SimpleIdentityProvider {
    domain: String,
    service: String,
    key: KeyPair,
    lifetime: Duration,
    current: Mutex<Option<PrincipalCredential>>,
}

impl SimpleIdentityProvider {
    pub fn new(domain: impl Into<String>, service: impl Into<String>, key: KeyPair) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            key,
            lifetime: Duration::seconds(DEFAULT_PRINCIPAL_LIFETIME_SECS),
            current: Mutex::new(None),
        }
    }

    /// Set the lifetime of signed credentials
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn key_id(&self) -> &str {
        self.key.kid()
    }

    fn sign_if_needed(&self) -> Result<PrincipalCredential, SigningError> {
        let now = Utc::now();
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(ntoken) = current.as_ref() {
            if ntoken.remaining_lifetime(now) * 10 > ntoken.lifetime() {
                return Ok(ntoken.clone());
            }
        }

        let ntoken = PrincipalCredential::builder(self.domain.as_str(), self.service.as_str())
            .lifetime(self.lifetime)
            .issued_at(now)
            .sign(&self.key)?;
        debug!(
            principal = %ntoken.principal_name(),
            key_id = %ntoken.key_id(),
            expires_at = ntoken.expires_at(),
            "Signed principal credential"
        );

        *current = Some(ntoken.clone());
        Ok(ntoken)
    }
}

#[async_trait]
impl IdentityProvider for SimpleIdentityProvider {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn service(&self) -> &str {
        &self.service
    }

    async fn principal_credential(&self) -> Result<PrincipalCredential, SigningError> {
        self.sign_if_needed()
    }
}
