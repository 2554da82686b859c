//! Shared helpers for the `key=value;...;s=<sig>` token encoding

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ed25519_dalek::Signature;
use std::collections::HashMap;

use crate::error::ValidationError;

/// Separator between the signed portion and the signature field
const SIGNATURE_FIELD: &str = ";s=";

/// Latest accepted timestamp, 9999-12-31T23:59:59Z. Keeps every window and
/// remaining lifetime well inside the range of `chrono::Duration`.
pub(crate) const MAX_TIMESTAMP: i64 = 253_402_300_799;

/// Split a token into its signed portion and the encoded signature.
pub(crate) fn split_signed(token: &str) -> Result<(&str, &str), ValidationError> {
    let idx = token
        .rfind(SIGNATURE_FIELD)
        .ok_or(ValidationError::MissingField("s"))?;
    let (unsigned, rest) = token.split_at(idx);
    let signature = &rest[SIGNATURE_FIELD.len()..];
    if signature.is_empty() {
        return Err(ValidationError::MissingField("s"));
    }
    Ok((unsigned, signature))
}

/// Parse the signed portion into a field map. Duplicate keys are rejected.
pub(crate) fn parse_fields(unsigned: &str) -> Result<HashMap<&str, &str>, ValidationError> {
    let mut fields = HashMap::new();
    for part in unsigned.split(';') {
        let (key, value) = part
            .split_once('=')
            .ok_or_else(|| ValidationError::Malformed(format!("field without '=': '{}'", part)))?;
        if key.is_empty() {
            return Err(ValidationError::Malformed("empty field name".into()));
        }
        if fields.insert(key, value).is_some() {
            return Err(ValidationError::Malformed(format!("duplicate field '{}'", key)));
        }
    }
    Ok(fields)
}

pub(crate) fn required<'a>(
    fields: &HashMap<&str, &'a str>,
    key: &'static str,
) -> Result<&'a str, ValidationError> {
    match fields.get(key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(ValidationError::MissingField(key)),
    }
}

pub(crate) fn timestamp(
    fields: &HashMap<&str, &str>,
    key: &'static str,
) -> Result<i64, ValidationError> {
    let raw = required(fields, key)?;
    let value = raw
        .parse::<i64>()
        .map_err(|_| ValidationError::Malformed(format!("field '{}' is not a timestamp: '{}'", key, raw)))?;
    if !(0..=MAX_TIMESTAMP).contains(&value) {
        return Err(ValidationError::Malformed(format!(
            "field '{}' is out of range: {}",
            key, value
        )));
    }
    Ok(value)
}

/// Expiry for a window of `lifetime_secs` starting at `issued_at`, if both
/// ends are representable on the wire.
pub(crate) fn window_end(issued_at: i64, lifetime_secs: i64) -> Option<i64> {
    if !(0..=MAX_TIMESTAMP).contains(&issued_at) {
        return None;
    }
    issued_at
        .checked_add(lifetime_secs)
        .filter(|end| *end <= MAX_TIMESTAMP)
}

pub(crate) fn encode_signature(signature: &Signature) -> String {
    URL_SAFE_NO_PAD.encode(signature.to_bytes())
}

pub(crate) fn decode_signature(encoded: &str) -> Result<Signature, ValidationError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| ValidationError::Malformed(format!("signature is not base64url: {}", e)))?;
    let bytes: [u8; 64] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| ValidationError::SignatureInvalid("Invalid signature length".into()))?;
    Ok(Signature::from_bytes(&bytes))
}

/// Random per-token salt so two tokens signed in the same second differ.
pub(crate) fn new_salt() -> String {
    format!("{:016x}", rand::random::<u64>())
}

fn is_label(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-')
}

/// Domain names are one or more dot-separated labels.
pub(crate) fn is_domain(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_label)
}

/// Service names are a single label.
pub(crate) fn is_service(s: &str) -> bool {
    is_label(s)
}

pub(crate) fn is_key_id(s: &str) -> bool {
    !s.is_empty()
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

pub(crate) fn is_role(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-' || b == b':'
        })
}
