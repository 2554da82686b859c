//! Role token provider
//!
//! Ties an identity, the exchange client and the cache together. This is the
//! entry point most callers want:
//!
//! ```ignore
//! let identity = Arc::new(SimpleIdentityProvider::new("media", "storage", key));
//! let provider = RoleTokenProvider::new(identity, &ClientConfig::from_env()?)?;
//!
//! let header = provider.authorization_header("sports", "readers").await?;
//! let response = send_authorized(&http, "https://sports.example.com/scores", &header).await?;
//! ```

use std::sync::Arc;
use tracing::debug;
use ztoken_core::RoleToken;

use crate::cache::{CacheKey, RoleTokenCache};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::exchange::ExchangeClient;
use crate::header::{AuthorizationHeader, HeaderBinder};
use crate::identity::IdentityProvider;

/// Cached role tokens for one service identity
pub struct RoleTokenProvider {
    identity: Arc<dyn IdentityProvider>,
    exchange: Arc<ExchangeClient>,
    cache: Arc<RoleTokenCache>,
    binder: HeaderBinder,
}

impl RoleTokenProvider {
    /// Build the exchange client and cache from configuration
    pub fn new(identity: Arc<dyn IdentityProvider>, config: &ClientConfig) -> Result<Self> {
        let exchange = Arc::new(ExchangeClient::new(config)?);
        let cache = Arc::new(RoleTokenCache::new(config.refresh.clone())?);
        Ok(Self::from_parts(
            identity,
            exchange,
            cache,
            HeaderBinder::new(config.role_header.clone()),
        ))
    }

    /// Assemble from existing parts, e.g. to share one cache
    pub fn from_parts(
        identity: Arc<dyn IdentityProvider>,
        exchange: Arc<ExchangeClient>,
        cache: Arc<RoleTokenCache>,
        binder: HeaderBinder,
    ) -> Self {
        Self {
            identity,
            exchange,
            cache,
            binder,
        }
    }

    /// Cache key for a provider domain and role under this identity
    pub fn cache_key(&self, provider_domain: &str, role: &str) -> CacheKey {
        CacheKey::new(
            self.identity.domain(),
            self.identity.service(),
            provider_domain,
            role,
        )
    }

    /// Valid role token for `role` in `provider_domain`, from cache or a
    /// fresh exchange
    pub async fn get_role_token(&self, provider_domain: &str, role: &str) -> Result<RoleToken> {
        let key = self.cache_key(provider_domain, role);
        let identity = Arc::clone(&self.identity);
        let exchange = Arc::clone(&self.exchange);
        let provider_domain = provider_domain.to_string();
        let role = role.to_string();

        self.cache
            .get_or_fetch(&key, move || async move {
                let ntoken = identity.principal_credential().await?;
                debug!(principal = %ntoken.principal_name(), "Exchanging principal credential");
                exchange
                    .fetch_role_token(&ntoken, &provider_domain, &role)
                    .await
            })
            .await
    }

    /// Role token bound to the configured header
    pub async fn authorization_header(
        &self,
        provider_domain: &str,
        role: &str,
    ) -> Result<AuthorizationHeader> {
        let token = self.get_role_token(provider_domain, role).await?;
        Ok(self.binder.bind(&token))
    }

    pub fn cache(&self) -> &RoleTokenCache {
        &self.cache
    }

    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }
}
