//! Client configuration
//!
//! `ClientConfig` can be deserialized, built with `with_*` setters, or read
//! from `ZTOKEN_*` environment variables:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `ZTOKEN_AUTHORITY_URL` | Authority base URL | required |
//! | `ZTOKEN_PRINCIPAL_HEADER` | Header carrying the principal credential | `Athenz-Principal-Auth` |
//! | `ZTOKEN_ROLE_HEADER` | Header carrying the role token | `Athenz-Role-Auth` |
//! | `ZTOKEN_TIMEOUT_SECS` | Exchange request timeout | `10` |
//! | `ZTOKEN_MIN_EXPIRY_SECS` | `minExpiryTime` sent to the authority | unset |
//! | `ZTOKEN_MAX_EXPIRY_SECS` | `maxExpiryTime` sent to the authority | unset |
//! | `ZTOKEN_REFRESH_RATIO` | Refresh when this fraction of lifetime remains | `0.2` |
//! | `ZTOKEN_MIN_REFRESH_SECS` | Lower bound on the refresh threshold | `0` |
//! | `ZTOKEN_SERVE_STALE` | Serve a still-valid token when refresh fails | `true` |
//! | `ZTOKEN_AUTHORITY_KEY_ID` + `ZTOKEN_AUTHORITY_PUBLIC_KEY` | Authority key (base64) for local signature checks | unset |

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ztoken_core::{RoleToken, SerializablePublicKey, PRINCIPAL_HEADER, ROLE_TOKEN_HEADER};

use crate::error::ConfigError;

/// When a cached role token is considered due for refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshPolicy {
    /// Fraction of the token lifetime below which a refresh is triggered
    #[serde(default = "default_refresh_ratio")]
    pub refresh_ratio: f64,

    /// Floor on the refresh threshold, in seconds
    #[serde(default)]
    pub min_refresh_secs: u64,

    /// Return a still-valid cached token when a refresh fails
    #[serde(default = "default_serve_stale")]
    pub serve_stale: bool,
}

/// Largest accepted `min_refresh_secs`
const MAX_MIN_REFRESH_SECS: u64 = 365 * 24 * 3600;

fn default_refresh_ratio() -> f64 {
    0.2
}

fn default_serve_stale() -> bool {
    true
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            refresh_ratio: default_refresh_ratio(),
            min_refresh_secs: 0,
            serve_stale: default_serve_stale(),
        }
    }
}

impl RefreshPolicy {
    pub fn with_refresh_ratio(mut self, ratio: f64) -> Self {
        self.refresh_ratio = ratio;
        self
    }

    pub fn with_min_refresh_secs(mut self, secs: u64) -> Self {
        self.min_refresh_secs = secs;
        self
    }

    pub fn with_serve_stale(mut self, serve_stale: bool) -> Self {
        self.serve_stale = serve_stale;
        self
    }

    /// Check the ratio lies in `[0, 1)` and the floor is at most a year
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..1.0).contains(&self.refresh_ratio) {
            return Err(ConfigError::Invalid {
                name: "refresh_ratio",
                value: self.refresh_ratio.to_string(),
            });
        }
        if self.min_refresh_secs > MAX_MIN_REFRESH_SECS {
            return Err(ConfigError::Invalid {
                name: "min_refresh_secs",
                value: self.min_refresh_secs.to_string(),
            });
        }
        Ok(())
    }

    /// Remaining lifetime below which `token` should be refreshed
    pub fn threshold(&self, token: &RoleToken) -> Duration {
        let lifetime = token.lifetime();
        let ratio = Duration::milliseconds(
            (lifetime.num_milliseconds() as f64 * self.refresh_ratio.clamp(0.0, 1.0)) as i64,
        );
        let floor = i64::try_from(self.min_refresh_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(lifetime);
        ratio.max(floor)
    }

    /// A token is fresh when unexpired and at least `threshold` remains
    pub fn is_fresh(&self, token: &RoleToken, now: chrono::DateTime<Utc>) -> bool {
        !token.is_expired(now) && token.remaining_lifetime(now) >= self.threshold(token)
    }
}

/// Exchange client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Authority base URL, e.g. `https://zts.example.com:4443`
    pub authority_url: String,

    #[serde(default = "default_principal_header")]
    pub principal_header: String,

    #[serde(default = "default_role_header")]
    pub role_header: String,

    /// Exchange request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_expiry_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_expiry_secs: Option<u64>,

    #[serde(default)]
    pub refresh: RefreshPolicy,

    /// Authority public keys; when non-empty, role token signatures are
    /// checked locally
    #[serde(default)]
    pub authority_keys: Vec<SerializablePublicKey>,
}

fn default_principal_header() -> String {
    PRINCIPAL_HEADER.to_string()
}

fn default_role_header() -> String {
    ROLE_TOKEN_HEADER.to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

impl ClientConfig {
    /// Create a configuration with defaults for everything but the URL
    pub fn new(authority_url: impl Into<String>) -> Self {
        Self {
            authority_url: authority_url.into(),
            principal_header: default_principal_header(),
            role_header: default_role_header(),
            timeout_secs: default_timeout_secs(),
            min_expiry_secs: None,
            max_expiry_secs: None,
            refresh: RefreshPolicy::default(),
            authority_keys: Vec::new(),
        }
    }

    pub fn with_principal_header(mut self, header: impl Into<String>) -> Self {
        self.principal_header = header.into();
        self
    }

    pub fn with_role_header(mut self, header: impl Into<String>) -> Self {
        self.role_header = header.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Bound the lifetime of issued role tokens
    pub fn with_expiry_bounds(mut self, min_secs: Option<u64>, max_secs: Option<u64>) -> Self {
        self.min_expiry_secs = min_secs;
        self.max_expiry_secs = max_secs;
        self
    }

    pub fn with_refresh(mut self, refresh: RefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_authority_key(mut self, key: SerializablePublicKey) -> Self {
        self.authority_keys.push(key);
        self
    }

    /// Read configuration from `ZTOKEN_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let authority_url = lookup("ZTOKEN_AUTHORITY_URL")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("ZTOKEN_AUTHORITY_URL"))?;
        let mut config = Self::new(authority_url);

        if let Some(header) = lookup("ZTOKEN_PRINCIPAL_HEADER") {
            config.principal_header = header;
        }
        if let Some(header) = lookup("ZTOKEN_ROLE_HEADER") {
            config.role_header = header;
        }
        if let Some(secs) = parse_var(&lookup, "ZTOKEN_TIMEOUT_SECS")? {
            config.timeout_secs = secs;
        }
        config.min_expiry_secs = parse_var(&lookup, "ZTOKEN_MIN_EXPIRY_SECS")?;
        config.max_expiry_secs = parse_var(&lookup, "ZTOKEN_MAX_EXPIRY_SECS")?;

        if let Some(ratio) = parse_var(&lookup, "ZTOKEN_REFRESH_RATIO")? {
            config.refresh.refresh_ratio = ratio;
        }
        if let Some(secs) = parse_var(&lookup, "ZTOKEN_MIN_REFRESH_SECS")? {
            config.refresh.min_refresh_secs = secs;
        }
        if let Some(serve_stale) = parse_var(&lookup, "ZTOKEN_SERVE_STALE")? {
            config.refresh.serve_stale = serve_stale;
        }

        match (
            lookup("ZTOKEN_AUTHORITY_KEY_ID"),
            lookup("ZTOKEN_AUTHORITY_PUBLIC_KEY"),
        ) {
            (Some(kid), Some(key)) => config.authority_keys.push(SerializablePublicKey { kid, key }),
            (None, None) => {}
            (Some(_), None) => return Err(ConfigError::Missing("ZTOKEN_AUTHORITY_PUBLIC_KEY")),
            (None, Some(_)) => return Err(ConfigError::Missing("ZTOKEN_AUTHORITY_KEY_ID")),
        }

        config.refresh.validate()?;
        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use ztoken_core::KeyPair;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::new("http://localhost:4443");

        assert_eq!(config.principal_header, "Athenz-Principal-Auth");
        assert_eq!(config.role_header, "Athenz-Role-Auth");
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.refresh.refresh_ratio, 0.2);
        assert!(config.refresh.serve_stale);
    }

    #[test]
    fn test_deserialize_minimal() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"authority_url": "http://zts:4443"}"#).unwrap();

        assert_eq!(config.authority_url, "http://zts:4443");
        assert_eq!(config.refresh, RefreshPolicy::default());
        assert!(config.authority_keys.is_empty());
    }

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("ZTOKEN_AUTHORITY_URL", "http://zts:4443"),
            ("ZTOKEN_MAX_EXPIRY_SECS", "900"),
            ("ZTOKEN_REFRESH_RATIO", "0.5"),
            ("ZTOKEN_SERVE_STALE", "false"),
        ]))
        .unwrap();

        assert_eq!(config.max_expiry_secs, Some(900));
        assert_eq!(config.min_expiry_secs, None);
        assert_eq!(config.refresh.refresh_ratio, 0.5);
        assert!(!config.refresh.serve_stale);
    }

    #[test]
    fn test_from_lookup_errors() {
        assert_eq!(
            ClientConfig::from_lookup(lookup_from(&[])).unwrap_err(),
            ConfigError::Missing("ZTOKEN_AUTHORITY_URL")
        );
        assert!(matches!(
            ClientConfig::from_lookup(lookup_from(&[
                ("ZTOKEN_AUTHORITY_URL", "http://zts"),
                ("ZTOKEN_TIMEOUT_SECS", "soon"),
            ])),
            Err(ConfigError::Invalid { name: "ZTOKEN_TIMEOUT_SECS", .. })
        ));
        assert!(matches!(
            ClientConfig::from_lookup(lookup_from(&[
                ("ZTOKEN_AUTHORITY_URL", "http://zts"),
                ("ZTOKEN_REFRESH_RATIO", "1.5"),
            ])),
            Err(ConfigError::Invalid { name: "refresh_ratio", .. })
        ));
        assert_eq!(
            ClientConfig::from_lookup(lookup_from(&[
                ("ZTOKEN_AUTHORITY_URL", "http://zts"),
                ("ZTOKEN_AUTHORITY_KEY_ID", "zts.0"),
            ]))
            .unwrap_err(),
            ConfigError::Missing("ZTOKEN_AUTHORITY_PUBLIC_KEY")
        );
    }

    #[test]
    fn test_refresh_policy_validation() {
        assert!(RefreshPolicy::default().validate().is_ok());
        assert!(RefreshPolicy::default().with_refresh_ratio(0.0).validate().is_ok());

        for ratio in [1.0, 1.5, -0.1, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                RefreshPolicy::default().with_refresh_ratio(ratio).validate(),
                Err(ConfigError::Invalid { name: "refresh_ratio", .. })
            ));
        }
        assert!(matches!(
            RefreshPolicy::default().with_min_refresh_secs(u64::MAX).validate(),
            Err(ConfigError::Invalid { name: "min_refresh_secs", .. })
        ));

        let deserialized: RefreshPolicy =
            serde_json::from_str(r#"{"refresh_ratio": 2.0}"#).unwrap();
        assert!(deserialized.validate().is_err());
    }

    #[test]
    fn test_threshold_with_unchecked_policy() {
        let key = KeyPair::generate("zts.0");
        let token = RoleToken::builder("sports", "media.storage")
            .role("readers")
            .lifetime(Duration::seconds(1000))
            .issue(&key)
            .unwrap();

        let policy = RefreshPolicy::default().with_min_refresh_secs(u64::MAX);
        assert_eq!(policy.threshold(&token), Duration::seconds(1000));
        assert!(!policy.is_fresh(&token, Utc::now() + Duration::seconds(1)));
    }

    #[test]
    fn test_refresh_threshold() {
        let key = KeyPair::generate("zts.0");
        let token = RoleToken::builder("sports", "media.storage")
            .role("readers")
            .lifetime(Duration::seconds(1000))
            .issue(&key)
            .unwrap();

        let policy = RefreshPolicy::default();
        assert_eq!(policy.threshold(&token), Duration::seconds(200));

        let floored = policy.clone().with_min_refresh_secs(300);
        assert_eq!(floored.threshold(&token), Duration::seconds(300));

        let now = Utc::now();
        assert!(policy.is_fresh(&token, now));
        assert!(!policy.is_fresh(&token, now + Duration::seconds(850)));
        assert!(!policy
            .with_refresh_ratio(0.0)
            .is_fresh(&token, now + Duration::seconds(1000)));
    }
}
