//! Role token issuance handler
//!
//! Verifies the caller's principal credential, checks the grant table, and
//! issues a signed role token for the requested provider domain and role.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use ztoken_core::{PrincipalCredential, RoleToken, RoleTokenResponse, PRINCIPAL_HEADER};

use crate::api::error::ApiError;
use crate::keys::KeyRegistry;
use crate::storage::GrantStore;

/// Authority configuration
#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    /// Lifetime of issued role tokens when the caller sets no bounds
    pub token_ttl_secs: u64,
    /// Upper bound on any issued role token's lifetime, whatever the caller
    /// asks for with `minExpiryTime`
    pub max_token_ttl_secs: u64,
    /// Header carrying the principal credential
    pub principal_header: String,
    /// Bearer token for the key and grant management routes. Those routes
    /// are disabled when unset.
    pub admin_token: Option<String>,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            token_ttl_secs: 3600,
            max_token_ttl_secs: 24 * 3600,
            principal_header: PRINCIPAL_HEADER.to_string(),
            admin_token: None,
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub registry: KeyRegistry,
    pub grants: Arc<dyn GrantStore>,
    pub config: AuthorityConfig,
}

/// Query string of the role token endpoint
#[derive(Debug, Deserialize)]
pub struct RoleTokenQuery {
    pub role: String,

    #[serde(rename = "minExpiryTime")]
    pub min_expiry_time: Option<u64>,

    #[serde(rename = "maxExpiryTime")]
    pub max_expiry_time: Option<u64>,
}

impl RoleTokenQuery {
    /// Configured lifetime raised to the requested minimum, then capped at
    /// the requested maximum and at `limit_secs`
    fn lifetime(&self, default_secs: u64, limit_secs: u64) -> u64 {
        let mut ttl = default_secs;
        if let Some(min) = self.min_expiry_time {
            ttl = ttl.max(min);
        }
        if let Some(max) = self.max_expiry_time {
            ttl = ttl.min(max);
        }
        ttl.min(limit_secs)
    }
}

/// Issue a role token
///
/// GET /zts/v1/domain/{domain}/token?role=...
pub async fn issue_role_token(
    State(state): State<Arc<AppState>>,
    Path(provider_domain): Path<String>,
    Query(query): Query<RoleTokenQuery>,
    headers: HeaderMap,
) -> Result<Json<RoleTokenResponse>, ApiError> {
    let raw = headers
        .get(state.config.principal_header.as_str())
        .ok_or_else(|| ApiError::Unauthorized("missing principal credential".into()))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("principal credential is not ASCII".into()))?;

    let ntoken = PrincipalCredential::parse(raw)?;
    let principal = ntoken.principal_name();

    let key = state
        .registry
        .service_key(ntoken.domain(), ntoken.service(), ntoken.key_id())
        .ok_or_else(|| {
            warn!(principal = %principal, key_id = %ntoken.key_id(), "Unknown service key");
            ApiError::Unauthorized(format!(
                "no key '{}' registered for {}",
                ntoken.key_id(),
                principal
            ))
        })?;

    ntoken.validate(Utc::now(), &key).map_err(|e| {
        warn!(principal = %principal, error = %e, "Principal credential rejected");
        ApiError::from(e)
    })?;

    let granted = state
        .grants
        .has_role(&provider_domain, &query.role, &principal)
        .await?;
    if !granted {
        info!(
            principal = %principal,
            provider_domain = %provider_domain,
            role = %query.role,
            "Role not granted"
        );
        return Err(ApiError::Forbidden(format!(
            "{} is not granted {}:{}",
            principal, provider_domain, query.role
        )));
    }

    let ttl = query.lifetime(state.config.token_ttl_secs, state.config.max_token_ttl_secs);
    if ttl == 0 {
        return Err(ApiError::BadRequest("requested token lifetime is zero".into()));
    }
    let lifetime = i64::try_from(ttl)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| ApiError::BadRequest(format!("token lifetime {}s is out of range", ttl)))?;

    let token = RoleToken::builder(provider_domain.as_str(), principal.as_str())
        .role(query.role.as_str())
        .lifetime(lifetime)
        .issue(state.registry.signing_key())?;

    info!(
        principal = %principal,
        provider_domain = %provider_domain,
        role = %query.role,
        expires_at = token.expires_at(),
        "Issued role token"
    );

    Ok(Json(RoleTokenResponse {
        expiry_time: token.expires_at(),
        token: token.as_str().to_string(),
    }))
}
