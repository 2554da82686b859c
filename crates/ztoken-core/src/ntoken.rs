//! Principal credential (ntoken)
//!
//! A principal credential is a self-asserted identity statement for a
//! `(domain, service)` pair, signed with the service's private key. The token
//! authority verifies it against the public key registered under
//! `(domain, service, key id)` before issuing role tokens.
//!
//! Invariants:
//! - `expires_at > issued_at`
//! - `expires_at - issued_at <= MAX_PRINCIPAL_LIFETIME_SECS`
//! - the signature covers every field except itself

use chrono::{DateTime, Duration, Utc};

use crate::crypto::{KeyPair, PublicKey};
use crate::error::{SigningError, ValidationError};
use crate::wire;

/// Version tag carried in the `v=` field
pub const PRINCIPAL_TOKEN_VERSION: &str = "S1";

/// Lifetime used by `PrincipalCredential::sign`
pub const DEFAULT_PRINCIPAL_LIFETIME_SECS: i64 = 3600;

/// Upper bound on any principal credential's validity window
pub const MAX_PRINCIPAL_LIFETIME_SECS: i64 = 24 * 3600;

/// Signed principal credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalCredential {
    domain: String,
    service: String,
    key_id: String,
    salt: String,
    issued_at: i64,
    expires_at: i64,
    /// Full wire form including the signature
    token: String,
}

impl PrincipalCredential {
    /// Sign a credential valid for the default lifetime starting at `now`.
    ///
    /// The key id embedded in the credential is the key pair's `kid`.
    pub fn sign(
        domain: &str,
        service: &str,
        key: &KeyPair,
        now: DateTime<Utc>,
    ) -> Result<Self, SigningError> {
        PrincipalCredentialBuilder::new(domain, service)
            .issued_at(now)
            .sign(key)
    }

    /// Create a builder
    pub fn builder(domain: impl Into<String>, service: impl Into<String>) -> PrincipalCredentialBuilder {
        PrincipalCredentialBuilder::new(domain, service)
    }

    /// Parse the wire form. The signature is NOT checked; use `verify`.
    pub fn parse(token: &str) -> Result<Self, ValidationError> {
        let (unsigned, signature) = wire::split_signed(token)?;
        wire::decode_signature(signature)?;
        let fields = wire::parse_fields(unsigned)?;

        let version = wire::required(&fields, "v")?;
        if version != PRINCIPAL_TOKEN_VERSION {
            return Err(ValidationError::UnsupportedVersion(version.to_string()));
        }

        let domain = wire::required(&fields, "d")?;
        let service = wire::required(&fields, "n")?;
        let key_id = wire::required(&fields, "k")?;
        if !wire::is_domain(domain) || !wire::is_service(service) || !wire::is_key_id(key_id) {
            return Err(ValidationError::Malformed(format!(
                "invalid principal identifiers: {}.{} key {}",
                domain, service, key_id
            )));
        }

        let salt = wire::required(&fields, "a")?;
        let issued_at = wire::timestamp(&fields, "t")?;
        let expires_at = wire::timestamp(&fields, "e")?;
        if expires_at <= issued_at {
            return Err(ValidationError::DegenerateWindow {
                issued_at,
                expires_at,
            });
        }

        Ok(Self {
            domain: domain.to_string(),
            service: service.to_string(),
            key_id: key_id.to_string(),
            salt: salt.to_string(),
            issued_at,
            expires_at,
            token: token.to_string(),
        })
    }

    /// Verify the signature against `key`
    pub fn verify(&self, key: &PublicKey) -> Result<(), ValidationError> {
        if key.kid() != self.key_id {
            return Err(ValidationError::KeyIdMismatch {
                expected: key.kid().to_string(),
                actual: self.key_id.clone(),
            });
        }

        let (unsigned, signature) = wire::split_signed(&self.token)?;
        let signature = wire::decode_signature(signature)?;
        key.verify(unsigned.as_bytes(), &signature)
    }

    /// Full check: signature, expiry and lifetime bound
    pub fn validate(&self, now: DateTime<Utc>, key: &PublicKey) -> Result<(), ValidationError> {
        self.verify(key)?;

        if self.is_expired(now) {
            return Err(ValidationError::Expired(self.expires_at));
        }

        // A difference that does not fit counts as too long
        let lifetime = self
            .expires_at
            .checked_sub(self.issued_at)
            .unwrap_or(i64::MAX);
        if lifetime > MAX_PRINCIPAL_LIFETIME_SECS {
            return Err(ValidationError::LifetimeTooLong(lifetime));
        }

        Ok(())
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Principal name in `domain.service` form
    pub fn principal_name(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    /// Issue time (Unix seconds)
    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    /// Expiry time (Unix seconds)
    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Total validity window
    pub fn lifetime(&self) -> Duration {
        Duration::seconds(self.expires_at - self.issued_at)
    }

    /// Time left before expiry, zero once expired
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Duration {
        Duration::seconds((self.expires_at - now.timestamp()).max(0))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }

    /// Wire form
    pub fn as_str(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Display for PrincipalCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.token)
    }
}

/// Builder for principal credentials
///
/// # Example
///
/// ```ignore
/// let ntoken = PrincipalCredential::builder("media", "storage")
///     .lifetime(Duration::minutes(30))
///     .issued_at(Utc::now())
///     .sign(&key_pair)?;
/// ```
#[derive(Debug)]
pub struct PrincipalCredentialBuilder {
    domain: String,
    service: String,
    lifetime: Duration,
    issued_at: Option<DateTime<Utc>>,
}

impl PrincipalCredentialBuilder {
    /// Create a new builder with the default lifetime
    pub fn new(domain: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            lifetime: Duration::seconds(DEFAULT_PRINCIPAL_LIFETIME_SECS),
            issued_at: None,
        }
    }

    /// Set the validity window
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set the issue time (defaults to now)
    pub fn issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = Some(issued_at);
        self
    }

    /// Serialize the canonical fields and sign them with `key`
    pub fn sign(self, key: &KeyPair) -> Result<PrincipalCredential, SigningError> {
        if !wire::is_domain(&self.domain) {
            return Err(SigningError::InvalidIdentifier {
                field: "domain",
                value: self.domain,
            });
        }
        if !wire::is_service(&self.service) {
            return Err(SigningError::InvalidIdentifier {
                field: "service",
                value: self.service,
            });
        }
        if !wire::is_key_id(key.kid()) {
            return Err(SigningError::InvalidIdentifier {
                field: "key id",
                value: key.kid().to_string(),
            });
        }

        let lifetime = self.lifetime.num_seconds();
        if lifetime <= 0 || lifetime > MAX_PRINCIPAL_LIFETIME_SECS {
            return Err(SigningError::InvalidLifetime(lifetime));
        }

        let issued_at = self.issued_at.unwrap_or_else(Utc::now).timestamp();
        let expires_at =
            wire::window_end(issued_at, lifetime).ok_or(SigningError::InvalidLifetime(lifetime))?;
        let salt = wire::new_salt();

        let unsigned = format!(
            "v={};d={};n={};k={};a={};t={};e={}",
            PRINCIPAL_TOKEN_VERSION,
            self.domain,
            self.service,
            key.kid(),
            salt,
            issued_at,
            expires_at
        );
        let signature = key.sign(unsigned.as_bytes())?;
        let token = format!("{};s={}", unsigned, wire::encode_signature(&signature));

        Ok(PrincipalCredential {
            domain: self.domain,
            service: self.service,
            key_id: key.kid().to_string(),
            salt,
            issued_at,
            expires_at,
            token,
        })
    }
}
