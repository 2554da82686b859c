//! Error types for token signing and validation

use thiserror::Error;

/// Errors raised while building and signing a principal credential.
///
/// None of these are retryable: they point at bad input or bad key material.
#[derive(Error, Debug, Clone)]
pub enum SigningError {
    /// Domain, service or key id is empty or contains reserved characters
    #[error("Invalid identifier for {field}: '{value}'")]
    InvalidIdentifier { field: &'static str, value: String },

    /// Requested lifetime is zero, negative or above the allowed maximum
    #[error("Invalid credential lifetime: {0}s")]
    InvalidLifetime(i64),

    /// Key material could not be decoded
    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    /// Key file could not be read or parsed
    #[error("Failed to load key from {path}: {reason}")]
    KeyLoad { path: String, reason: String },

    /// Signature computation failed
    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

/// Errors raised while parsing or validating a received token.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Token string is not a well-formed field list
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// A required field is absent
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Version tag is not the one expected for this token kind
    #[error("Unsupported token version: {0}")]
    UnsupportedVersion(String),

    /// Expiry is not after issue time
    #[error("Degenerate validity window: issued at {issued_at}, expires at {expires_at}")]
    DegenerateWindow { issued_at: i64, expires_at: i64 },

    /// Token is past its expiry
    #[error("Token expired at {0}")]
    Expired(i64),

    /// Validity window exceeds the allowed maximum
    #[error("Token lifetime {0}s exceeds the allowed maximum")]
    LifetimeTooLong(i64),

    /// Signature did not verify
    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Token names a different key than the one used for verification
    #[error("Key ID mismatch: expected '{expected}', got '{actual}'")]
    KeyIdMismatch { expected: String, actual: String },

    /// No verification key is known for the token's key id
    #[error("Unknown signing key: {0}")]
    UnknownKey(String),

    /// Token is not bound to what was requested
    #[error("Token binding mismatch: expected {expected}, got {actual}")]
    BindingMismatch { expected: String, actual: String },
}

impl From<ed25519_dalek::SignatureError> for SigningError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        SigningError::Crypto(err.to_string())
    }
}

impl From<ed25519_dalek::SignatureError> for ValidationError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        ValidationError::SignatureInvalid(err.to_string())
    }
}
