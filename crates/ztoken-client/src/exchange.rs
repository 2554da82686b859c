//! Token exchange client
//!
//! Presents a principal credential to the token authority and returns the
//! validated role token. Performs no retries and touches no cache; callers
//! decide what to do with an `ExchangeError`.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use ztoken_core::protocol::{self, RoleTokenResponse};
use ztoken_core::{KeyRing, PrincipalCredential, PublicKey, RoleToken, ValidationError};

use crate::config::ClientConfig;
use crate::error::{ExchangeError, Result};

pub use ztoken_core::PRINCIPAL_HEADER;

/// Longest response body excerpt kept in an `Unavailable` error
const ERROR_BODY_LIMIT: usize = 512;

/// HTTP client for the authority's role token endpoint
///
/// Owns its `reqwest::Client`; connections are released when the exchange
/// client is dropped.
#[derive(Debug)]
pub struct ExchangeClient {
    http: reqwest::Client,
    base_url: String,
    principal_header: String,
    min_expiry_secs: Option<u64>,
    max_expiry_secs: Option<u64>,
    authority_keys: Option<Arc<KeyRing>>,
}

impl ExchangeClient {
    /// Build a client from configuration
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Self::with_http_client(config, http)
    }

    /// Build a client around an existing `reqwest::Client`
    pub fn with_http_client(config: &ClientConfig, http: reqwest::Client) -> Result<Self> {
        let authority_keys = if config.authority_keys.is_empty() {
            None
        } else {
            let ring = KeyRing::new();
            for key in &config.authority_keys {
                ring.insert(PublicKey::try_from(key.clone())?);
            }
            Some(Arc::new(ring))
        };

        Ok(Self {
            http,
            base_url: config.authority_url.trim_end_matches('/').to_string(),
            principal_header: config.principal_header.clone(),
            min_expiry_secs: config.min_expiry_secs,
            max_expiry_secs: config.max_expiry_secs,
            authority_keys,
        })
    }

    /// Verify role token signatures against `keys`
    pub fn with_authority_keys(mut self, keys: Arc<KeyRing>) -> Self {
        self.authority_keys = Some(keys);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange `ntoken` for a role token granting `role` in `provider_domain`
    pub async fn fetch_role_token(
        &self,
        ntoken: &PrincipalCredential,
        provider_domain: &str,
        role: &str,
    ) -> Result<RoleToken> {
        if !protocol::is_domain_name(provider_domain) {
            return Err(ExchangeError::InvalidRequest {
                field: "provider domain",
                value: provider_domain.to_string(),
            });
        }
        if !protocol::is_role_name(role) {
            return Err(ExchangeError::InvalidRequest {
                field: "role",
                value: role.to_string(),
            });
        }

        let principal = ntoken.principal_name();
        let url = format!("{}{}", self.base_url, protocol::role_token_path(provider_domain));

        let mut query = vec![(protocol::ROLE_PARAM, role.to_string())];
        if let Some(min) = self.min_expiry_secs {
            query.push((protocol::MIN_EXPIRY_PARAM, min.to_string()));
        }
        if let Some(max) = self.max_expiry_secs {
            query.push((protocol::MAX_EXPIRY_PARAM, max.to_string()));
        }

        debug!(
            principal = %principal,
            provider_domain = %provider_domain,
            role = %role,
            url = %url,
            "Requesting role token"
        );

        let response = self
            .http
            .get(&url)
            .query(&query)
            .header(self.principal_header.as_str(), ntoken.as_str())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            info!(
                principal = %principal,
                provider_domain = %provider_domain,
                role = %role,
                "Authority denied role token"
            );
            return Err(ExchangeError::Forbidden {
                provider_domain: provider_domain.to_string(),
                role: role.to_string(),
            });
        }

        let body = response.text().await?;
        if status != reqwest::StatusCode::OK {
            return Err(ExchangeError::Unavailable {
                status: Some(status.as_u16()),
                message: excerpt(&body),
            });
        }

        let parsed: RoleTokenResponse =
            serde_json::from_str(&body).map_err(|e| ExchangeError::Unavailable {
                status: Some(status.as_u16()),
                message: format!("malformed response body: {}", e),
            })?;

        self.check_response(&parsed, &principal, provider_domain, role)
            .inspect_err(|e| {
                warn!(
                    provider_domain = %provider_domain,
                    role = %role,
                    error = %e,
                    "Authority returned a role token that failed validation"
                );
            })
            .map_err(ExchangeError::from)
    }

    fn check_response(
        &self,
        response: &RoleTokenResponse,
        principal: &str,
        provider_domain: &str,
        role: &str,
    ) -> std::result::Result<RoleToken, ValidationError> {
        let token = RoleToken::parse(&response.token)?;

        if response.expiry_time != token.expires_at() {
            return Err(ValidationError::Malformed(format!(
                "expiryTime {} does not match token expiry {}",
                response.expiry_time,
                token.expires_at()
            )));
        }

        token.check_binding(provider_domain, role)?;
        if token.principal() != principal {
            return Err(ValidationError::BindingMismatch {
                expected: format!("principal {}", principal),
                actual: format!("principal {}", token.principal()),
            });
        }
        token.validate(Utc::now(), self.authority_keys.as_deref())?;

        debug!(
            provider_domain = %provider_domain,
            role = %role,
            expires_at = token.expires_at(),
            "Received role token"
        );
        Ok(token)
    }
}

fn excerpt(body: &str) -> String {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ztoken_core::{KeyPair, SerializablePublicKey};

    #[test]
    fn test_trailing_slash_trimmed() {
        let client = ExchangeClient::new(&ClientConfig::new("http://zts:4443/")).unwrap();
        assert_eq!(client.base_url(), "http://zts:4443");
    }

    #[test]
    fn test_invalid_authority_key_rejected() {
        let config = ClientConfig::new("http://zts").with_authority_key(SerializablePublicKey {
            kid: "zts.0".into(),
            key: "not base64!".into(),
        });

        assert!(matches!(
            ExchangeClient::new(&config),
            Err(ExchangeError::Signing(_))
        ));
    }

    #[test]
    fn test_check_response() {
        let authority = KeyPair::generate("zts.0");
        let config = ClientConfig::new("http://zts")
            .with_authority_key(SerializablePublicKey::from(&authority.public_key()));
        let client = ExchangeClient::new(&config).unwrap();

        let token = RoleToken::builder("sports", "media.storage")
            .role("readers")
            .issue(&authority)
            .unwrap();
        let response = RoleTokenResponse {
            token: token.as_str().to_string(),
            expiry_time: token.expires_at(),
        };

        assert_eq!(client.check_response(&response, "media.storage", "sports", "readers"), Ok(token.clone()));
        assert!(matches!(
            client.check_response(&response, "media.storage", "sports", "writers"),
            Err(ValidationError::BindingMismatch { .. })
        ));

        let wrong_expiry = RoleTokenResponse {
            expiry_time: token.expires_at() + 1,
            ..response
        };
        assert!(matches!(
            client.check_response(&wrong_expiry, "media.storage", "sports", "readers"),
            Err(ValidationError::Malformed(_))
        ));
    }

    #[test]
    fn test_check_response_rejects_other_principal() {
        let authority = KeyPair::generate("zts.0");
        let client = ExchangeClient::new(&ClientConfig::new("http://zts")).unwrap();

        let token = RoleToken::builder("sports", "media.billing")
            .role("readers")
            .issue(&authority)
            .unwrap();
        let response = RoleTokenResponse {
            token: token.as_str().to_string(),
            expiry_time: token.expires_at(),
        };

        assert!(matches!(
            client.check_response(&response, "media.storage", "sports", "readers"),
            Err(ValidationError::BindingMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_names_rejected_before_sending() {
        // Nothing listens here; a request would fail with Unavailable
        let client = ExchangeClient::new(&ClientConfig::new("http://127.0.0.1:9")).unwrap();
        let ntoken =
            PrincipalCredential::sign("media", "storage", &KeyPair::generate("0"), Utc::now())
                .unwrap();

        assert!(matches!(
            client.fetch_role_token(&ntoken, "../admin", "readers").await,
            Err(ExchangeError::InvalidRequest { field: "provider domain", .. })
        ));
        assert!(matches!(
            client.fetch_role_token(&ntoken, "sports", "readers&role=admin").await,
            Err(ExchangeError::InvalidRequest { field: "role", .. })
        ));
    }

    #[test]
    fn test_excerpt_truncates() {
        let long = "x".repeat(ERROR_BODY_LIMIT + 10);
        assert_eq!(excerpt(&long).len(), ERROR_BODY_LIMIT + 3);
        assert_eq!(excerpt("short"), "short");
    }
}
