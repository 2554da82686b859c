//! ztoken Authority
//!
//! A development token-issuing authority. It verifies principal credentials
//! against registered service keys, checks a flat in-memory grant table, and
//! issues Ed25519-signed role tokens.
//!
//! ## API Endpoints
//!
//! - `GET /health` - Liveness check with the authority key id
//! - `GET /zts/v1/domain/{domain}/token?role=...` - Issue a role token; the
//!   principal credential travels in the `Athenz-Principal-Auth` header.
//!   Optional `minExpiryTime` / `maxExpiryTime` bound the lifetime (seconds),
//!   which never exceeds `max_token_ttl_secs`
//! - `GET /zts/v1/keys/authority` - Fetch the role token signing key
//!
//! Management routes require `Authorization: Bearer <admin token>` and are
//! refused outright when no admin token is configured:
//!
//! - `POST /zts/v1/keys` - Register a service public key (`replace` to rotate)
//! - `DELETE /zts/v1/keys` - Remove a service public key
//! - `POST /zts/v1/grants` - Grant a principal a role
//! - `DELETE /zts/v1/grants` - Revoke a grant
//! - `GET /zts/v1/grants/{domain}` - List a provider domain's grants
//!
//! ## Status Codes
//!
//! | Case | Status |
//! |---|---|
//! | Missing, malformed, expired or unverifiable principal credential | 401 |
//! | Role not granted | 403 |
//! | Conflicting service key registration | 409 |
//! | Issued | 200 with `{"token": ..., "expiryTime": ...}` |

pub mod api;
pub mod keys;
pub mod storage;

pub use api::create_router;
pub use api::handlers::{AppState, AuthorityConfig};
pub use keys::{KeyRegistry, RegistryError, ServiceKeyId};
pub use storage::{Grant, GrantStore, MemoryGrantStore, StorageError};
