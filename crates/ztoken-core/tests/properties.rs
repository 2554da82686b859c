//! Property-based tests for token invariants
//!
//! 1. A signed principal credential expires exactly one lifetime after issue
//!    and re-parses to the same identity
//! 2. Any change to the signed bytes is detected
//! 3. Role token remaining lifetime never goes negative and never exceeds the
//!    issued lifetime

use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use ztoken_core::{
    KeyPair, KeyRing, PrincipalCredential, RoleToken, DEFAULT_PRINCIPAL_LIFETIME_SECS,
};

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

// =============================================================================
// PRINCIPAL CREDENTIAL
// =============================================================================

proptest! {
    #[test]
    fn prop_expiry_is_issue_plus_default_lifetime(
        domain in "[a-z][a-z0-9_-]{0,8}(\\.[a-z0-9_-]{1,8}){0,2}",
        service in "[a-z][a-z0-9_-]{0,12}",
        kid in "[A-Za-z0-9][A-Za-z0-9._-]{0,6}",
        now in 1_000_000_000i64..2_000_000_000i64,
    ) {
        let key = KeyPair::generate(kid.clone());
        let ntoken = PrincipalCredential::sign(&domain, &service, &key, at(now)).unwrap();

        prop_assert_eq!(ntoken.issued_at(), now);
        prop_assert_eq!(ntoken.expires_at(), now + DEFAULT_PRINCIPAL_LIFETIME_SECS);

        let parsed = PrincipalCredential::parse(ntoken.as_str()).unwrap();
        prop_assert_eq!(parsed.domain(), domain.as_str());
        prop_assert_eq!(parsed.service(), service.as_str());
        prop_assert_eq!(parsed.key_id(), kid.as_str());
        prop_assert!(parsed.validate(at(now), &key.public_key()).is_ok());
    }

    #[test]
    fn prop_distinct_issue_times_give_distinct_credentials(
        now in 1_000_000_000i64..2_000_000_000i64,
        delta in 1i64..100_000,
    ) {
        let key = KeyPair::generate("0");
        let a = PrincipalCredential::sign("media", "storage", &key, at(now)).unwrap();
        let b = PrincipalCredential::sign("media", "storage", &key, at(now + delta)).unwrap();

        prop_assert_ne!(a.as_str(), b.as_str());
    }

    /// Flipping any byte of the signed portion breaks either parsing or
    /// verification
    #[test]
    fn prop_tampering_is_detected(index in any::<prop::sample::Index>(), replacement in b'a'..=b'z') {
        let key = KeyPair::generate("0");
        let ntoken = PrincipalCredential::sign("media", "storage", &key, Utc::now()).unwrap();
        let token = ntoken.as_str();
        let signed_len = token.rfind(";s=").unwrap();

        let i = index.index(signed_len);
        let mut bytes = token.as_bytes().to_vec();
        prop_assume!(bytes[i] != replacement);
        bytes[i] = replacement;
        let tampered = String::from_utf8(bytes).unwrap();

        let rejected = match PrincipalCredential::parse(&tampered) {
            Ok(parsed) => parsed.verify(&key.public_key()).is_err(),
            Err(_) => true,
        };
        prop_assert!(rejected);
    }
}

// =============================================================================
// ROLE TOKEN
// =============================================================================

proptest! {
    #[test]
    fn prop_remaining_lifetime_is_clamped(
        lifetime in 1i64..86_400,
        offset in -10_000i64..200_000,
    ) {
        let issued = at(1_700_000_000);
        let token = RoleToken::builder("sports", "media.storage")
            .role("readers")
            .lifetime(Duration::seconds(lifetime))
            .issued_at(issued)
            .issue(&KeyPair::generate("zts.0"))
            .unwrap();

        let now = issued + Duration::seconds(offset);
        let remaining = token.remaining_lifetime(now);

        prop_assert!(remaining >= Duration::zero());
        prop_assert!(remaining <= Duration::seconds(lifetime - offset.min(0)));
        prop_assert_eq!(remaining.is_zero(), token.is_expired(now));
    }

    #[test]
    fn prop_roles_survive_reparse(
        roles in prop::collection::btree_set("[a-z][a-z0-9._:-]{0,10}", 1..5),
    ) {
        let key = KeyPair::generate("zts.0");
        let ring = KeyRing::new().with_key(key.public_key());
        let token = RoleToken::builder("sports", "media.storage")
            .roles(roles.iter().cloned())
            .issue(&key)
            .unwrap();

        let parsed = RoleToken::parse(token.as_str()).unwrap();
        prop_assert!(parsed.is_valid(Utc::now(), Some(&ring)));
        for role in &roles {
            prop_assert!(parsed.has_role(role));
        }
        prop_assert_eq!(parsed.roles().len(), roles.len());
    }
}
