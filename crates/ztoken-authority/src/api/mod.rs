//! HTTP API of the authority

pub mod admin;
pub mod error;
pub mod handlers;

use axum::{
    extract::State,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use handlers::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub authority_kid: String,
    pub service_keys: usize,
}

/// Health check endpoint
///
/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        authority_kid: state.registry.authority_kid().to_string(),
        service_keys: state.registry.service_key_count(),
    })
}

/// Create the API router
///
/// Key and grant management routes sit behind `admin::require_admin`.
pub fn create_router(state: Arc<AppState>) -> Router {
    let management = Router::new()
        .route(
            "/zts/v1/keys",
            post(handlers::register_service_key).delete(handlers::unregister_service_key),
        )
        .route(
            "/zts/v1/grants",
            post(handlers::add_grant).delete(handlers::revoke_grant),
        )
        .route("/zts/v1/grants/{domain}", get(handlers::list_grants))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin::require_admin,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/zts/v1/domain/{domain}/token", get(handlers::issue_role_token))
        .route("/zts/v1/keys/authority", get(handlers::authority_key))
        .merge(management)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
