//! Role token cache
//!
//! Holds one role token per `(domain, service, provider domain, role)` and
//! refreshes it ahead of expiry according to a `RefreshPolicy`.
//!
//! Locking:
//! - the key map sits behind a `std::sync::Mutex` that is only held to look up
//!   or insert a slot, never across an `.await`
//! - each slot has its own `tokio::sync::Mutex`; the read-check-refresh
//!   sequence for a key runs under it, so concurrent callers for one key
//!   share a single exchange while distinct keys never contend
//! - the exchange runs in a spawned task that owns the slot guard, so a caller
//!   that stops waiting does not abort it and its result still lands in the
//!   cache
//!
//! Callers queued behind an exchange receive its outcome, error included.
//! A caller that arrives after the exchange has finished starts a new one:
//! errors are never served from the cache.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use ztoken_core::RoleToken;

use crate::config::RefreshPolicy;
use crate::error::{ConfigError, ExchangeError, Result};

/// Identity of one role token grant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub domain: String,
    pub service: String,
    pub provider_domain: String,
    pub role: String,
}

impl CacheKey {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        provider_domain: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            provider_domain: provider_domain.into(),
            role: role.into(),
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}->{}:{}",
            self.domain, self.service, self.provider_domain, self.role
        )
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    token: RoleToken,
    fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.fetched_at).num_seconds()
    }
}

#[derive(Debug, Default)]
struct SlotState {
    entry: Option<CacheEntry>,
    /// Outcome of the most recent exchange
    last_outcome: Option<Result<RoleToken>>,
}

#[derive(Debug, Default)]
struct Slot {
    /// Exchanges completed for this key
    completed: AtomicU64,
    state: Arc<tokio::sync::Mutex<SlotState>>,
}

/// Concurrent role token cache with per-key request coalescing
#[derive(Debug, Default)]
pub struct RoleTokenCache {
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
    policy: RefreshPolicy,
}

impl RoleTokenCache {
    /// Create a cache, rejecting an out-of-range refresh policy
    pub fn new(policy: RefreshPolicy) -> std::result::Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self {
            slots: Mutex::new(HashMap::new()),
            policy,
        })
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    fn slot(&self, key: &CacheKey) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.clone()).or_default().clone()
    }

    fn existing_slot(&self, key: &CacheKey) -> Option<Arc<Slot>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).cloned()
    }

    fn all_slots(&self) -> Vec<Arc<Slot>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().cloned().collect()
    }

    /// Return the cached token for `key`, calling `fetch` when there is none
    /// or it is due for refresh.
    ///
    /// If `fetch` fails while a cached token is still valid and the policy
    /// allows stale serving, the cached token is returned instead. Callers
    /// that were waiting on the same key while `fetch` ran get its outcome
    /// without fetching again. Failures are never cached.
    pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<RoleToken>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<RoleToken>> + Send + 'static,
    {
        let slot = self.slot(key);
        let seen = slot.completed.load(Ordering::Acquire);
        let mut guard = Arc::clone(&slot.state).lock_owned().await;
        let now = Utc::now();

        if let Some(entry) = guard.entry.as_ref() {
            if self.policy.is_fresh(&entry.token, now) {
                debug!(key = %key, age_secs = entry.age_secs(now), "Role token cache hit");
                return Ok(entry.token.clone());
            }
        }

        // An exchange finished while this caller was queued
        if slot.completed.load(Ordering::Acquire) != seen {
            match guard.last_outcome.clone() {
                Some(Err(err)) => {
                    debug!(key = %key, error = %err, "Sharing failed exchange with waiter");
                    return Err(err);
                }
                Some(Ok(token)) if !token.is_expired(now) => return Ok(token),
                _ => {}
            }
        }

        debug!(key = %key, cached = guard.entry.is_some(), "Fetching role token");

        let policy = self.policy.clone();
        let key = key.clone();
        let task = tokio::spawn(async move {
            let result = fetch().await;
            let now = Utc::now();

            let outcome = match result {
                Ok(token) => {
                    guard.entry = Some(CacheEntry {
                        token: token.clone(),
                        fetched_at: now,
                    });
                    Ok(token)
                }
                Err(err) => {
                    let still_valid = guard
                        .entry
                        .as_ref()
                        .filter(|entry| !entry.token.is_expired(now))
                        .cloned();

                    match still_valid {
                        Some(entry) if policy.serve_stale => {
                            warn!(
                                key = %key,
                                error = %err,
                                age_secs = entry.age_secs(now),
                                remaining_secs = entry.token.remaining_lifetime(now).num_seconds(),
                                "Role token refresh failed, serving cached token"
                            );
                            Ok(entry.token)
                        }
                        Some(_) => Err(err),
                        None => {
                            guard.entry = None;
                            Err(err)
                        }
                    }
                }
            };

            guard.last_outcome = Some(outcome.clone());
            slot.completed.fetch_add(1, Ordering::AcqRel);
            outcome
        });

        task.await.map_err(|e| ExchangeError::Unavailable {
            status: None,
            message: format!("role token exchange task failed: {}", e),
        })?
    }

    /// Cached token for `key` if it is still valid. Never fetches.
    pub async fn peek(&self, key: &CacheKey) -> Option<RoleToken> {
        let slot = self.existing_slot(key)?;
        let guard = slot.state.lock().await;
        guard
            .entry
            .as_ref()
            .filter(|entry| !entry.token.is_expired(Utc::now()))
            .map(|entry| entry.token.clone())
    }

    /// Drop the cached token for `key`
    pub async fn invalidate(&self, key: &CacheKey) {
        if let Some(slot) = self.existing_slot(key) {
            slot.state.lock().await.entry = None;
            debug!(key = %key, "Invalidated role token");
        }
    }

    /// Drop every cached token
    pub async fn clear(&self) {
        for slot in self.all_slots() {
            slot.state.lock().await.entry = None;
        }
    }

    /// Remove expired entries and unused slots. Slots with an exchange in
    /// flight are skipped. Returns the number of tokens removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut purged = 0;

        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|_, slot| {
            let Ok(mut guard) = slot.state.try_lock() else {
                return true;
            };
            if guard.entry.as_ref().is_some_and(|e| e.token.is_expired(now)) {
                guard.entry = None;
                purged += 1;
            }
            guard.entry.is_some() || Arc::strong_count(slot) > 1
        });

        if purged > 0 {
            debug!(purged, "Purged expired role tokens");
        }
        purged
    }

    /// Number of cached tokens, including any past their refresh threshold
    pub async fn len(&self) -> usize {
        let mut count = 0;
        for slot in self.all_slots() {
            if slot.state.lock().await.entry.is_some() {
                count += 1;
            }
        }
        count
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
