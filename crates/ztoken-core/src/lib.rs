//! # ztoken Core
//!
//! Token types and cryptographic primitives for decentralized
//! service-to-service authorization.
//!
//! ## Key Concepts
//!
//! - **Principal credential (ntoken)**: a short-lived identity assertion for a
//!   `(domain, service)` pair, self-signed with the service's private key
//! - **Role token (ztoken)**: a time-bounded grant issued by the token
//!   authority for one provider domain and role set
//! - **Key ring**: public keys indexed by key id, used to verify either kind
//!   of token
//!
//! ## Wire Format
//!
//! Both tokens are `;`-separated `key=value` lists whose final field `s=` is an
//! Ed25519 signature over every byte before it:
//!
//! ```text
//! v=S1;d=media;n=storage;k=0;a=6f1c2e...;t=1700000000;e=1700003600;s=...
//! v=Z1;d=sports;r=readers;p=media.storage;a=...;t=...;e=...;k=zts-0;s=...
//! ```

pub mod crypto;
pub mod error;
pub mod keys;
pub mod ntoken;
pub mod protocol;
pub mod role_token;
mod wire;

pub use crypto::{KeyPair, PublicKey, SerializablePublicKey};
pub use error::{SigningError, ValidationError};
pub use keys::KeyRing;
pub use ntoken::{
    PrincipalCredential, PrincipalCredentialBuilder, DEFAULT_PRINCIPAL_LIFETIME_SECS,
    MAX_PRINCIPAL_LIFETIME_SECS, PRINCIPAL_TOKEN_VERSION,
};
pub use protocol::{RoleTokenResponse, PRINCIPAL_HEADER, ROLE_TOKEN_HEADER};
pub use role_token::{RoleToken, RoleTokenBuilder, ROLE_TOKEN_VERSION};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
