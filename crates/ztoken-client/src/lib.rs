//! ztoken Client
//!
//! Obtains role tokens from a token authority and attaches them to outbound
//! requests.
//!
//! ## Flow
//!
//! 1. An `IdentityProvider` signs a principal credential for the calling
//!    service
//! 2. The `ExchangeClient` presents it to the authority and receives a role
//!    token for one provider domain and role
//! 3. The `RoleTokenCache` keeps the token until it nears expiry, coalescing
//!    concurrent requests for the same grant; callers queued behind an
//!    exchange share its result, failures included
//! 4. The `HeaderBinder` turns the token into a request header, and
//!    `send_authorized` calls the provider with it
//!
//! `RoleTokenProvider` wires steps 1-3 together.
//!
//! ## Errors
//!
//! Every fallible operation returns `ExchangeError`. `Forbidden` is a policy
//! decision and is never cached; `Unavailable` keeps the authority's HTTP
//! status for diagnostics; `is_retryable()` tells callers whether another
//! attempt can help.

pub mod cache;
pub mod config;
pub mod error;
pub mod exchange;
pub mod header;
pub mod identity;
pub mod provider;
pub mod request;

pub use cache::{CacheKey, RoleTokenCache};
pub use config::{ClientConfig, RefreshPolicy};
pub use error::{ConfigError, ExchangeError, Result};
pub use exchange::{ExchangeClient, PRINCIPAL_HEADER};
pub use header::{bind, AuthorizationHeader, HeaderBinder, ROLE_TOKEN_HEADER};
pub use identity::{IdentityProvider, SimpleIdentityProvider};
pub use provider::RoleTokenProvider;
pub use request::{send_authorized, ProviderResponse};
