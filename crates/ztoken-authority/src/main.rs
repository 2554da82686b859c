//! ztoken Authority Server Binary
//!
//! Runs the development role token authority.

use std::env;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use ztoken_authority::{create_router, AppState, AuthorityConfig, KeyRegistry, MemoryGrantStore};
use ztoken_core::KeyPair;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let log_level = env::var("ZTOKEN_AUTHORITY_LOG_LEVEL")
        .unwrap_or_else(|_| "info".into())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    // Configuration
    let port: u16 = env::var("ZTOKEN_AUTHORITY_PORT")
        .unwrap_or_else(|_| "4443".into())
        .parse()
        .map_err(|e| format!("ZTOKEN_AUTHORITY_PORT must be a valid port number: {}", e))?;

    let kid = env::var("ZTOKEN_AUTHORITY_KEY_ID")
        .unwrap_or_else(|_| format!("zts-{}", uuid::Uuid::new_v4()));

    let token_ttl_secs: u64 = match env::var("ZTOKEN_AUTHORITY_TOKEN_TTL_SECS") {
        Ok(raw) => raw
            .parse()
            .map_err(|e| format!("ZTOKEN_AUTHORITY_TOKEN_TTL_SECS must be a number: {}", e))?,
        Err(_) => AuthorityConfig::default().token_ttl_secs,
    };

    let max_token_ttl_secs: u64 = match env::var("ZTOKEN_AUTHORITY_MAX_TOKEN_TTL_SECS") {
        Ok(raw) => raw.parse().map_err(|e| {
            format!("ZTOKEN_AUTHORITY_MAX_TOKEN_TTL_SECS must be a number: {}", e)
        })?,
        Err(_) => AuthorityConfig::default().max_token_ttl_secs,
    };

    let bind_addr = env::var("ZTOKEN_AUTHORITY_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".into());

    let admin_token = env::var("ZTOKEN_AUTHORITY_ADMIN_TOKEN")
        .ok()
        .filter(|token| !token.is_empty());
    if admin_token.is_none() {
        warn!("ZTOKEN_AUTHORITY_ADMIN_TOKEN is not set, key and grant management is disabled");
    }

    // Signing key: loaded when a path is given, generated otherwise
    let registry = match env::var("ZTOKEN_AUTHORITY_KEY_PATH") {
        Ok(path) => KeyRegistry::new(KeyPair::load(&path, kid)?),
        Err(_) => KeyRegistry::generate(kid),
    };

    let config = AuthorityConfig {
        token_ttl_secs,
        max_token_ttl_secs,
        admin_token,
        ..AuthorityConfig::default()
    };

    info!(
        kid = %registry.authority_kid(),
        token_ttl_secs = config.token_ttl_secs,
        max_token_ttl_secs = config.max_token_ttl_secs,
        port = port,
        "Starting ztoken authority"
    );

    let state = Arc::new(AppState {
        registry,
        grants: Arc::new(MemoryGrantStore::new()),
        config,
    });

    let app = create_router(state);

    let addr = format!("{}:{}", bind_addr, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(addr = %addr, "ztoken authority listening");

    axum::serve(listener, app).await?;
    Ok(())
}
