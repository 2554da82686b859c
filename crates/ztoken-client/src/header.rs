//! Authorization header binding

use ztoken_core::RoleToken;

pub use ztoken_core::ROLE_TOKEN_HEADER;

/// Header name/value pair carrying a role token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationHeader {
    pub name: String,
    pub value: String,
}

/// Bind `token` to the default role token header
pub fn bind(token: &RoleToken) -> AuthorizationHeader {
    HeaderBinder::default().bind(token)
}

/// Binds role tokens to a configurable header name
#[derive(Debug, Clone)]
pub struct HeaderBinder {
    name: String,
}

impl Default for HeaderBinder {
    fn default() -> Self {
        Self::new(ROLE_TOKEN_HEADER)
    }
}

impl HeaderBinder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn header_name(&self) -> &str {
        &self.name
    }

    pub fn bind(&self, token: &RoleToken) -> AuthorizationHeader {
        AuthorizationHeader {
            name: self.name.clone(),
            value: token.as_str().to_string(),
        }
    }
}
