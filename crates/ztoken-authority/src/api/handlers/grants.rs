//! Grant table handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ztoken_core::protocol::{is_domain_name, is_role_name, is_service_name};

use crate::api::error::ApiError;
use crate::api::handlers::token::AppState;
use crate::storage::Grant;

/// Grant or revoke a role for a principal
#[derive(Debug, Serialize, Deserialize)]
pub struct GrantRequest {
    pub provider_domain: String,
    pub role: String,
    /// `domain.service`
    pub principal: String,
}

/// Grant a role
///
/// POST /zts/v1/grants
pub async fn add_grant(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GrantRequest>,
) -> Result<(StatusCode, Json<Grant>), ApiError> {
    if !is_domain_name(&request.provider_domain) || !is_role_name(&request.role) {
        return Err(ApiError::BadRequest(format!(
            "invalid role '{}' in domain '{}'",
            request.role, request.provider_domain
        )));
    }
    if !is_principal_name(&request.principal) {
        return Err(ApiError::BadRequest(format!(
            "principal '{}' is not in domain.service form",
            request.principal
        )));
    }

    let grant = Grant::new(request.provider_domain, request.role, request.principal);
    state.grants.grant(grant.clone()).await?;

    Ok((StatusCode::CREATED, Json(grant)))
}

fn is_principal_name(principal: &str) -> bool {
    principal
        .rsplit_once('.')
        .is_some_and(|(domain, service)| is_domain_name(domain) && is_service_name(service))
}

/// Revoke a role
///
/// DELETE /zts/v1/grants
pub async fn revoke_grant(
    State(state): State<Arc<AppState>>,
    Json(request): Json<GrantRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .grants
        .revoke(&request.provider_domain, &request.role, &request.principal)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// List the grants in a provider domain
///
/// GET /zts/v1/grants/{domain}
pub async fn list_grants(
    State(state): State<Arc<AppState>>,
    Path(provider_domain): Path<String>,
) -> Result<Json<Vec<Grant>>, ApiError> {
    let mut grants = state.grants.list(&provider_domain).await?;
    grants.sort_by(|a, b| (&a.role, &a.principal).cmp(&(&b.role, &b.principal)));
    Ok(Json(grants))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_names() {
        assert!(is_principal_name("media.storage"));
        assert!(is_principal_name("media.eu.storage"));
        assert!(!is_principal_name("storage"));
        assert!(!is_principal_name("media."));
        assert!(!is_principal_name(".storage"));
        assert!(!is_principal_name("media/x.storage"));
    }
}
