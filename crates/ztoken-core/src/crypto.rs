//! Cryptographic primitives for token signing
//!
//! Both token kinds are signed with Ed25519. A service signs its principal
//! credentials with its own key pair; the token authority signs role tokens
//! with its key pair.
//!
//! Key types:
//! - `KeyPair`: Ed25519 key pair plus the key id it is registered under
//! - `PublicKey`: Ed25519 public key for verification
//! - `SerializablePublicKey`: base64 form for storage/transmission

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{SigningError, ValidationError};

const PEM_MARKER: &str = "-----BEGIN";

/// Ed25519 key pair used to sign tokens
#[derive(Clone)]
pub struct KeyPair {
    /// Key identifier
    kid: String,
    /// Ed25519 signing key (private)
    signing_key: SigningKey,
    /// Ed25519 verifying key (public)
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("kid", &self.kid)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate(kid: impl Into<String>) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self::from_signing_key(kid, signing_key)
    }

    /// Create a key pair from an existing signing key
    pub fn from_signing_key(kid: impl Into<String>, signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            kid: kid.into(),
            signing_key,
            verifying_key,
        }
    }

    /// Create a key pair from the raw 32-byte secret
    pub fn from_bytes(kid: impl Into<String>, bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(kid, SigningKey::from_bytes(bytes))
    }

    /// Parse a PKCS#8 PEM encoded Ed25519 private key
    pub fn from_pem(kid: impl Into<String>, pem: &str) -> Result<Self, SigningError> {
        let signing_key = SigningKey::from_pkcs8_pem(pem)
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Ok(Self::from_signing_key(kid, signing_key))
    }

    /// Parse the base64 encoding of the raw 32-byte secret
    pub fn from_base64(kid: impl Into<String>, encoded: &str) -> Result<Self, SigningError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SigningError::InvalidKey("Invalid key length".into()))?;
        Ok(Self::from_bytes(kid, &bytes))
    }

    /// Load a private key file.
    ///
    /// Accepts a PKCS#8 PEM file or a file holding the base64 encoded raw
    /// secret. The key id is not stored in the file; it is the id the public
    /// half was registered under.
    pub fn load(path: impl AsRef<Path>, kid: impl Into<String>) -> Result<Self, SigningError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| SigningError::KeyLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let parsed = if contents.contains(PEM_MARKER) {
            Self::from_pem(kid, &contents)
        } else {
            Self::from_base64(kid, &contents)
        };

        parsed.map_err(|e| SigningError::KeyLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
    }

    /// Get the key identifier
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Get the public key
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            kid: self.kid.clone(),
            verifying_key: self.verifying_key,
        }
    }

    /// Get the raw signing key bytes
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign arbitrary bytes
    pub fn sign(&self, data: &[u8]) -> Result<Signature, SigningError> {
        self.signing_key.try_sign(data).map_err(SigningError::from)
    }
}

/// Ed25519 public key for verification
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// Key identifier
    kid: String,
    /// Ed25519 verifying key
    verifying_key: VerifyingKey,
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("kid", &self.kid)
            .finish()
    }
}

impl PublicKey {
    /// Create a public key from raw bytes
    pub fn from_bytes(kid: impl Into<String>, bytes: &[u8; 32]) -> Result<Self, SigningError> {
        let verifying_key = VerifyingKey::from_bytes(bytes)
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Ok(Self {
            kid: kid.into(),
            verifying_key,
        })
    }

    /// Parse a SubjectPublicKeyInfo PEM encoded Ed25519 public key
    pub fn from_pem(kid: impl Into<String>, pem: &str) -> Result<Self, SigningError> {
        let verifying_key = VerifyingKey::from_public_key_pem(pem)
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Ok(Self {
            kid: kid.into(),
            verifying_key,
        })
    }

    /// Parse the base64 encoding of the raw 32-byte public key
    pub fn from_base64(kid: impl Into<String>, encoded: &str) -> Result<Self, SigningError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| SigningError::InvalidKey("Invalid key length".into()))?;
        Self::from_bytes(kid, &bytes)
    }

    /// Get the key identifier
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Base64 encoding of the raw key bytes
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.to_bytes())
    }

    /// Get the raw verifying key bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Verify a signature over `data`
    pub fn verify(&self, data: &[u8], signature: &Signature) -> Result<(), ValidationError> {
        self.verifying_key
            .verify(data, signature)
            .map_err(ValidationError::from)
    }
}

/// Serializable public key for storage/transmission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializablePublicKey {
    /// Key identifier
    pub kid: String,
    /// Base64-encoded public key bytes
    pub key: String,
}

impl From<&PublicKey> for SerializablePublicKey {
    fn from(pk: &PublicKey) -> Self {
        Self {
            kid: pk.kid.clone(),
            key: pk.to_base64(),
        }
    }
}

impl TryFrom<SerializablePublicKey> for PublicKey {
    type Error = SigningError;

    fn try_from(spk: SerializablePublicKey) -> Result<Self, SigningError> {
        PublicKey::from_base64(spk.kid, &spk.key)
    }
}
