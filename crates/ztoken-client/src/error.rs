//! Error types for the exchange client

use thiserror::Error;
use ztoken_core::{SigningError, ValidationError};

/// Result type for exchange client operations
pub type Result<T> = std::result::Result<T, ExchangeError>;

/// Errors raised while obtaining or using a role token
#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    /// The authority refused to issue the role (HTTP 403)
    #[error("Authority denied role '{role}' in domain '{provider_domain}'")]
    Forbidden {
        provider_domain: String,
        role: String,
    },

    /// Transport failure, unexpected status or unreadable response
    #[error("Authority unavailable (status {}): {message}", display_status(.status))]
    Unavailable {
        status: Option<u16>,
        message: String,
    },

    /// The returned role token failed validation
    #[error("Role token rejected: {0}")]
    Validation(#[from] ValidationError),

    /// The principal credential could not be signed
    #[error("Principal credential signing failed: {0}")]
    Signing(#[from] SigningError),

    /// Provider domain or role is not a valid name; nothing was sent
    #[error("Invalid {field} '{value}'")]
    InvalidRequest { field: &'static str, value: String },

    /// Client settings are out of range
    #[error("Invalid client configuration: {0}")]
    Config(#[from] ConfigError),
}

fn display_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    }
}

impl ExchangeError {
    /// Whether a later attempt may succeed without changing inputs
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::Forbidden { .. }
            | ExchangeError::Signing(_)
            | ExchangeError::InvalidRequest { .. }
            | ExchangeError::Config(_) => false,
            ExchangeError::Unavailable { .. } | ExchangeError::Validation(_) => true,
        }
    }

    /// HTTP status received from the authority, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            ExchangeError::Forbidden { .. } => Some(403),
            ExchangeError::Unavailable { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        ExchangeError::Unavailable {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Errors raised while reading client configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is absent
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    /// A setting could not be parsed
    #[error("Invalid value for {name}: '{value}'")]
    Invalid { name: &'static str, value: String },
}
