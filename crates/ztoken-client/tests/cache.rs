//! Role token cache behaviour under refresh, failure and concurrency

use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use ztoken_client::{CacheKey, ConfigError, ExchangeError, RefreshPolicy, RoleTokenCache};
use ztoken_core::{KeyPair, RoleToken};

// =============================================================================
// Test Helpers
// =============================================================================

fn key(role: &str) -> CacheKey {
    CacheKey::new("media", "storage", "sports", role)
}

/// Token issued `age_secs` ago that expires `remaining_secs` from now
fn token_with(age_secs: i64, remaining_secs: i64) -> RoleToken {
    RoleToken::builder("sports", "media.storage")
        .role("readers")
        .issued_at(Utc::now() - Duration::seconds(age_secs))
        .lifetime(Duration::seconds(age_secs + remaining_secs))
        .issue(&KeyPair::generate("zts.0"))
        .unwrap()
}

fn fresh_token() -> RoleToken {
    token_with(0, 3600)
}

/// Inside the default refresh threshold but not expired
fn near_expiry_token() -> RoleToken {
    token_with(3600, 60)
}

fn unavailable() -> ExchangeError {
    ExchangeError::Unavailable {
        status: Some(503),
        message: "authority overloaded".into(),
    }
}

async fn seed(cache: &RoleTokenCache, key: &CacheKey, token: RoleToken) {
    cache
        .get_or_fetch(key, move || async move { Ok(token) })
        .await
        .unwrap();
}

// =============================================================================
// Refresh
// =============================================================================

#[tokio::test]
async fn test_near_expiry_token_is_refreshed() {
    let cache = RoleTokenCache::default();
    let stale = near_expiry_token();
    seed(&cache, &key("readers"), stale.clone()).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let refreshed = cache
        .get_or_fetch(&key("readers"), move || async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(fresh_token())
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_ne!(refreshed, stale);
    assert_eq!(cache.peek(&key("readers")).await, Some(refreshed));
}

#[tokio::test]
async fn test_min_refresh_floor_triggers_refresh() {
    // 10 minutes left is above 20% of a 30 minute token, but below the floor
    let cache = RoleTokenCache::new(RefreshPolicy::default().with_min_refresh_secs(900)).unwrap();
    seed(&cache, &key("readers"), token_with(1200, 600)).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    cache
        .get_or_fetch(&key("readers"), move || async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(fresh_token())
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_stale_token_served_when_refresh_fails() {
    let cache = RoleTokenCache::default();
    let stale = near_expiry_token();
    seed(&cache, &key("readers"), stale.clone()).await;

    let served = cache
        .get_or_fetch(&key("readers"), || async { Err(unavailable()) })
        .await
        .unwrap();

    assert_eq!(served, stale);
}

#[tokio::test]
async fn test_stale_serving_can_be_disabled() {
    let cache = RoleTokenCache::new(RefreshPolicy::default().with_serve_stale(false)).unwrap();
    let stale = near_expiry_token();
    seed(&cache, &key("readers"), stale.clone()).await;

    let result = cache
        .get_or_fetch(&key("readers"), || async { Err(unavailable()) })
        .await;

    assert!(matches!(
        result,
        Err(ExchangeError::Unavailable { status: Some(503), .. })
    ));
    // The still-valid entry is kept
    assert_eq!(cache.peek(&key("readers")).await, Some(stale));
}

#[tokio::test]
async fn test_expired_entry_dropped_when_refresh_fails() {
    let cache = RoleTokenCache::default();
    seed(&cache, &key("readers"), token_with(3600, -1)).await;

    let result = cache
        .get_or_fetch(&key("readers"), || async { Err(unavailable()) })
        .await;

    assert!(result.is_err());
    assert!(cache.is_empty().await);
}

#[tokio::test]
async fn test_forbidden_is_not_cached() {
    let cache = RoleTokenCache::default();
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let counted = calls.clone();
        let result = cache
            .get_or_fetch(&key("writers"), move || async move {
                counted.fetch_add(1, Ordering::SeqCst);
                Err(ExchangeError::Forbidden {
                    provider_domain: "sports".into(),
                    role: "writers".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(ExchangeError::Forbidden { .. })));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_exchange() {
    let cache = Arc::new(RoleTokenCache::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_fetch(&key("readers"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(StdDuration::from_millis(50)).await;
                    Ok(fresh_token())
                })
                .await
        }));
    }

    let mut tokens = Vec::new();
    for handle in handles {
        tokens.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(tokens.windows(2).all(|pair| pair[0] == pair[1]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_share_one_failure() {
    let cache = Arc::new(RoleTokenCache::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let started = std::time::Instant::now();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_fetch(&key("readers"), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(StdDuration::from_millis(100)).await;
                    Err(unavailable())
                })
                .await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(matches!(
            result,
            Err(ExchangeError::Unavailable { status: Some(503), .. })
        ));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(started.elapsed() < StdDuration::from_millis(500));

    // The failure is not cached: the next caller exchanges again
    let counted = calls.clone();
    cache
        .get_or_fetch(&key("readers"), move || async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(fresh_token())
        })
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_keys_fetch_independently() {
    let cache = Arc::new(RoleTokenCache::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for role in ["readers", "writers", "admins"] {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_fetch(&key(role), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(StdDuration::from_millis(20)).await;
                    Ok(fresh_token())
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(cache.len().await, 3);
}

#[tokio::test]
async fn test_abandoned_caller_still_fills_cache() {
    let cache = Arc::new(RoleTokenCache::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let counted = calls.clone();
    let abandoned = tokio::time::timeout(
        StdDuration::from_millis(10),
        cache.get_or_fetch(&key("readers"), move || async move {
            counted.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(StdDuration::from_millis(100)).await;
            Ok(fresh_token())
        }),
    )
    .await;
    assert!(abandoned.is_err());

    // The next caller waits for the in-flight exchange instead of starting one
    let token = cache
        .get_or_fetch(&key("readers"), || async {
            Err(ExchangeError::Unavailable {
                status: None,
                message: "should not be called".into(),
            })
        })
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.peek(&key("readers")).await, Some(token));
}

// =============================================================================
// Maintenance
// =============================================================================

#[test]
fn test_out_of_range_policy_rejected() {
    assert!(matches!(
        RoleTokenCache::new(RefreshPolicy::default().with_refresh_ratio(1.0)),
        Err(ConfigError::Invalid { name: "refresh_ratio", .. })
    ));
    assert!(matches!(
        RoleTokenCache::new(RefreshPolicy::default().with_refresh_ratio(f64::NAN)),
        Err(ConfigError::Invalid { .. })
    ));
}

#[tokio::test]
async fn test_purge_expired() {
    let cache = RoleTokenCache::default();
    seed(&cache, &key("readers"), token_with(3600, -10)).await;
    seed(&cache, &key("writers"), fresh_token()).await;

    assert_eq!(cache.len().await, 2);
    assert_eq!(cache.purge_expired(), 1);
    assert_eq!(cache.len().await, 1);
    assert!(cache.peek(&key("writers")).await.is_some());
}
