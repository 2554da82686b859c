//! Exchange protocol constants and message bodies shared by the client and
//! the issuing authority

use serde::{Deserialize, Serialize};

use crate::wire;

/// Request header carrying the principal credential to the authority
pub const PRINCIPAL_HEADER: &str = "Athenz-Principal-Auth";

/// Request header carrying the role token to a provider
pub const ROLE_TOKEN_HEADER: &str = "Athenz-Role-Auth";

/// Query parameter naming the requested role
pub const ROLE_PARAM: &str = "role";

/// Query parameter for the minimum acceptable token lifetime (seconds)
pub const MIN_EXPIRY_PARAM: &str = "minExpiryTime";

/// Query parameter for the maximum acceptable token lifetime (seconds)
pub const MAX_EXPIRY_PARAM: &str = "maxExpiryTime";

/// Path of the role token endpoint for a provider domain, relative to the
/// authority base URL
pub fn role_token_path(provider_domain: &str) -> String {
    format!("/zts/v1/domain/{}/token", provider_domain)
}

/// Whether `name` is a valid domain name: dot-separated labels of
/// `[a-z0-9_-]`
pub fn is_domain_name(name: &str) -> bool {
    wire::is_domain(name)
}

/// Whether `name` is a valid service name: a single label
pub fn is_service_name(name: &str) -> bool {
    wire::is_service(name)
}

/// Whether `name` can be requested as a role
pub fn is_role_name(name: &str) -> bool {
    wire::is_role(name)
}

/// Body of a successful role token response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleTokenResponse {
    /// Role token wire form
    pub token: String,
    /// Token expiry (Unix seconds)
    #[serde(rename = "expiryTime")]
    pub expiry_time: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_field_names() {
        let body = r#"{"token":"v=Z1;s=x","expiryTime":1700003600}"#;
        let parsed: RoleTokenResponse = serde_json::from_str(body).unwrap();

        assert_eq!(parsed.expiry_time, 1_700_003_600);
        assert_eq!(serde_json::to_string(&parsed).unwrap(), body);
    }

    #[test]
    fn test_role_token_path() {
        assert_eq!(role_token_path("sports"), "/zts/v1/domain/sports/token");
    }

    #[test]
    fn test_name_rules() {
        assert!(is_domain_name("sports.eu"));
        assert!(!is_domain_name("../admin"));
        assert!(!is_domain_name("sports/token?x="));
        assert!(is_role_name("readers"));
        assert!(!is_role_name("readers&role=admin"));
    }
}
