//! Guard for the key and grant management routes
//!
//! Requests must carry `Authorization: Bearer <admin token>`. Without a
//! configured admin token every management request is refused.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::api::error::ApiError;
use crate::api::handlers::AppState;

/// Middleware admitting only requests with the configured admin token
pub async fn require_admin(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state
        .config
        .admin_token
        .as_deref()
        .filter(|token| !token.is_empty())
    else {
        return Err(ApiError::Forbidden("management API is disabled".into()));
    };

    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| tokens_match(token, expected));

    if !authorized {
        warn!(
            method = %request.method(),
            path = %request.uri().path(),
            "Rejected management request"
        );
        return Err(ApiError::Unauthorized("valid admin token required".into()));
    }

    Ok(next.run(request).await)
}

/// Comparison whose running time does not depend on where the inputs differ
fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_match() {
        assert!(tokens_match("s3cret", "s3cret"));
        assert!(!tokens_match("s3cret", "s3creT"));
        assert!(!tokens_match("s3cre", "s3cret"));
        assert!(!tokens_match("", "s3cret"));
    }
}
