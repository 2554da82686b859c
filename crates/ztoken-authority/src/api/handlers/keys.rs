//! Service key handlers
//!
//! Services register the public half of the key they sign principal
//! credentials with. The authority's own public key is published so clients
//! can verify role tokens locally.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ztoken_core::protocol::{is_domain_name, is_service_name};
use ztoken_core::{PublicKey, SerializablePublicKey};

use crate::api::error::ApiError;
use crate::api::handlers::token::AppState;
use crate::keys::ServiceKeyId;

/// Request to register a service public key
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterServiceKeyRequest {
    pub domain: String,
    pub service: String,
    pub key_id: String,
    /// Base64-encoded Ed25519 public key (32 bytes)
    pub public_key: String,
    /// Overwrite a different key already registered under this id
    #[serde(default)]
    pub replace: bool,
}

/// Identifies a registered service key
#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceKeyRequest {
    pub domain: String,
    pub service: String,
    pub key_id: String,
}

/// Response from service key registration
#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterServiceKeyResponse {
    pub principal: String,
    pub key_id: String,
    pub message: String,
}

/// Register a service public key
///
/// POST /zts/v1/keys
pub async fn register_service_key(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterServiceKeyRequest>,
) -> Result<Json<RegisterServiceKeyResponse>, ApiError> {
    if !is_domain_name(&request.domain) || !is_service_name(&request.service) {
        return Err(ApiError::BadRequest(format!(
            "invalid service identity '{}.{}'",
            request.domain, request.service
        )));
    }
    if request.key_id.is_empty() {
        return Err(ApiError::BadRequest("key_id is required".into()));
    }

    let key = PublicKey::from_base64(request.key_id.as_str(), &request.public_key)?;
    let message = if request.replace {
        state
            .registry
            .replace_service_key(request.domain.as_str(), request.service.as_str(), key);
        "Service key replaced"
    } else {
        state
            .registry
            .register_service_key(request.domain.as_str(), request.service.as_str(), key)?;
        "Service key registered"
    };

    Ok(Json(RegisterServiceKeyResponse {
        principal: format!("{}.{}", request.domain, request.service),
        key_id: request.key_id,
        message: message.into(),
    }))
}

/// Remove a service public key
///
/// DELETE /zts/v1/keys
pub async fn unregister_service_key(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ServiceKeyRequest>,
) -> Result<StatusCode, ApiError> {
    let id = ServiceKeyId::new(request.domain, request.service, request.key_id);
    if state.registry.unregister_service_key(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("service key {}", id)))
    }
}

/// Publish the authority's role token signing key
///
/// GET /zts/v1/keys/authority
pub async fn authority_key(State(state): State<Arc<AppState>>) -> Json<SerializablePublicKey> {
    Json(SerializablePublicKey::from(&state.registry.authority_public_key()))
}
