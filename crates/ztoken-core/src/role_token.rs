//! Role token (ztoken)
//!
//! Issued by the token authority after it has verified a principal
//! credential. A role token binds one principal to a set of roles in exactly
//! one provider domain for a bounded window, and is signed with the
//! authority's key. Providers (and the client cache) check it with
//! `validate`.

use chrono::{DateTime, Duration, Utc};
use tracing::warn;

use crate::crypto::{KeyPair, PublicKey};
use crate::error::{SigningError, ValidationError};
use crate::keys::KeyRing;
use crate::wire;

/// Version tag carried in the `v=` field
pub const ROLE_TOKEN_VERSION: &str = "Z1";

/// Signed role token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleToken {
    provider_domain: String,
    roles: Vec<String>,
    principal: String,
    salt: String,
    issued_at: i64,
    expires_at: i64,
    key_id: String,
    token: String,
}

impl RoleToken {
    /// Start building a token for `principal` (`domain.service`) in
    /// `provider_domain`
    pub fn builder(provider_domain: impl Into<String>, principal: impl Into<String>) -> RoleTokenBuilder {
        RoleTokenBuilder::new(provider_domain, principal)
    }

    /// Parse the wire form. The signature is NOT checked here.
    pub fn parse(token: &str) -> Result<Self, ValidationError> {
        let (unsigned, signature) = wire::split_signed(token)?;
        wire::decode_signature(signature)?;
        let fields = wire::parse_fields(unsigned)?;

        let version = wire::required(&fields, "v")?;
        if version != ROLE_TOKEN_VERSION {
            return Err(ValidationError::UnsupportedVersion(version.to_string()));
        }

        let provider_domain = wire::required(&fields, "d")?;
        if !wire::is_domain(provider_domain) {
            return Err(ValidationError::Malformed(format!(
                "invalid provider domain '{}'",
                provider_domain
            )));
        }

        let roles: Vec<String> = wire::required(&fields, "r")?
            .split(',')
            .map(str::to_string)
            .collect();
        if let Some(bad) = roles.iter().find(|r| !wire::is_role(r)) {
            return Err(ValidationError::Malformed(format!("invalid role '{}'", bad)));
        }

        let principal = wire::required(&fields, "p")?;
        if !is_principal(principal) {
            return Err(ValidationError::Malformed(format!(
                "invalid principal '{}'",
                principal
            )));
        }

        let key_id = wire::required(&fields, "k")?;
        if !wire::is_key_id(key_id) {
            return Err(ValidationError::Malformed(format!("invalid key id '{}'", key_id)));
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
            provider_domain: provider_domain.to_string(),
            roles,
            principal: principal.to_string(),
            salt: salt.to_string(),
            issued_at,
            expires_at,
            key_id: key_id.to_string(),
            token: token.to_string(),
        })
    }

    /// Verify the signature against a single authority key
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

    /// Check expiry and, when `authority` is given, the signature.
    ///
    /// With a key ring, a token whose key id is not in the ring is rejected
    /// with `UnknownKey`. Without one, only the validity window is checked.
    pub fn validate(
        &self,
        now: DateTime<Utc>,
        authority: Option<&KeyRing>,
    ) -> Result<(), ValidationError> {
        if self.expires_at <= self.issued_at {
            return Err(ValidationError::DegenerateWindow {
                issued_at: self.issued_at,
                expires_at: self.expires_at,
            });
        }
        if now.timestamp() >= self.expires_at {
            return Err(ValidationError::Expired(self.expires_at));
        }

        if let Some(ring) = authority {
            let key = ring
                .get(&self.key_id)
                .ok_or_else(|| ValidationError::UnknownKey(self.key_id.clone()))?;
            self.verify(&key)?;
        }

        Ok(())
    }

    /// Boolean form of `validate`
    pub fn is_valid(&self, now: DateTime<Utc>, authority: Option<&KeyRing>) -> bool {
        match self.validate(now, authority) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    provider_domain = %self.provider_domain,
                    principal = %self.principal,
                    error = %e,
                    "Role token failed validation"
                );
                false
            }
        }
    }

    /// Check the token grants `role` in `provider_domain`
    pub fn check_binding(&self, provider_domain: &str, role: &str) -> Result<(), ValidationError> {
        if self.provider_domain != provider_domain {
            return Err(ValidationError::BindingMismatch {
                expected: format!("domain {}", provider_domain),
                actual: format!("domain {}", self.provider_domain),
            });
        }
        if !self.has_role(role) {
            return Err(ValidationError::BindingMismatch {
                expected: format!("role {}", role),
                actual: format!("roles {}", self.roles.join(",")),
            });
        }
        Ok(())
    }

    /// `expiry - now`, zero once expired
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Duration {
        Duration::seconds((self.expires_at - now.timestamp()).max(0))
    }

    /// `expiry - issue`
    pub fn lifetime(&self) -> Duration {
        Duration::seconds(self.expires_at - self.issued_at)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }

    pub fn provider_domain(&self) -> &str {
        &self.provider_domain
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Principal the token was issued to, `domain.service`
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Authority key id
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    /// Wire form
    pub fn as_str(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Display for RoleToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.token)
    }
}

impl std::str::FromStr for RoleToken {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn is_principal(s: &str) -> bool {
    match s.rsplit_once('.') {
        Some((domain, service)) => wire::is_domain(domain) && wire::is_service(service),
        None => false,
    }
}

/// Builder for role tokens, used by the issuing authority
#[derive(Debug)]
pub struct RoleTokenBuilder {
    provider_domain: String,
    principal: String,
    roles: Vec<String>,
    lifetime: Duration,
    issued_at: Option<DateTime<Utc>>,
}

impl RoleTokenBuilder {
    /// Create a builder with a one hour lifetime and no roles
    pub fn new(provider_domain: impl Into<String>, principal: impl Into<String>) -> Self {
        Self {
            provider_domain: provider_domain.into(),
            principal: principal.into(),
            roles: Vec::new(),
            lifetime: Duration::hours(1),
            issued_at: None,
        }
    }

    /// Add a role
    pub fn role(mut self, role: impl Into<String>) -> Self {
        let role = role.into();
        if !self.roles.contains(&role) {
            self.roles.push(role);
        }
        self
    }

    /// Add several roles
    pub fn roles<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        roles.into_iter().fold(self, |b, r| b.role(r))
    }

    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Set the issue time (defaults to now)
    pub fn issued_at(mut self, issued_at: DateTime<Utc>) -> Self {
        self.issued_at = Some(issued_at);
        self
    }

    /// Sign the token with the authority key
    pub fn issue(self, authority: &KeyPair) -> Result<RoleToken, SigningError> {
        if !wire::is_domain(&self.provider_domain) {
            return Err(SigningError::InvalidIdentifier {
                field: "provider domain",
                value: self.provider_domain,
            });
        }
        if !is_principal(&self.principal) {
            return Err(SigningError::InvalidIdentifier {
                field: "principal",
                value: self.principal,
            });
        }
        if self.roles.is_empty() {
            return Err(SigningError::InvalidIdentifier {
                field: "role",
                value: String::new(),
            });
        }
        if let Some(bad) = self.roles.iter().find(|r| !wire::is_role(r)) {
            return Err(SigningError::InvalidIdentifier {
                field: "role",
                value: bad.clone(),
            });
        }
        if !wire::is_key_id(authority.kid()) {
            return Err(SigningError::InvalidIdentifier {
                field: "key id",
                value: authority.kid().to_string(),
            });
        }

        let lifetime = self.lifetime.num_seconds();
        if lifetime <= 0 {
            return Err(SigningError::InvalidLifetime(lifetime));
        }

        let issued_at = self.issued_at.unwrap_or_else(Utc::now).timestamp();
        let expires_at =
            wire::window_end(issued_at, lifetime).ok_or(SigningError::InvalidLifetime(lifetime))?;
        let salt = wire::new_salt();

        let unsigned = format!(
            "v={};d={};r={};p={};a={};t={};e={};k={}",
            ROLE_TOKEN_VERSION,
            self.provider_domain,
            self.roles.join(","),
            self.principal,
            salt,
            issued_at,
            expires_at,
            authority.kid()
        );
        let signature = authority.sign(unsigned.as_bytes())?;
        let token = format!("{};s={}", unsigned, wire::encode_signature(&signature));

        Ok(RoleToken {
            provider_domain: self.provider_domain,
            roles: self.roles,
            principal: self.principal,
            salt,
            issued_at,
            expires_at,
            key_id: authority.kid().to_string(),
            token,
        })
    }
}
