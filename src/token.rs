//! # Access-Token Cache
//!
//! The catalog needs a bearer token that costs an auth round-trip to obtain
//! and stays valid for about an hour. One [`TokenCache`] per catalog client
//! keeps the current token and refreshes it once it expires.
//!
//! Concurrent requests may race to refresh. The lock is only held to read or
//! overwrite the slot, never across the network call, so two racers both
//! fetch a token and the last one written wins. Tokens are interchangeable,
//! so that is harmless.

use anyhow::Result;
use log::debug;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Tokens are treated as expired this long before the issuer says so.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Time source, swappable in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A freshly issued token and its advertised lifetime.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: Duration,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct TokenCache<C: Clock = SystemClock> {
    clock: C,
    slot: Mutex<Option<CachedToken>>,
}

impl Default for TokenCache<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: Clock> TokenCache<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            slot: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<CachedToken>> {
        // A poisoned slot only ever holds a complete token or nothing.
        self.slot.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// The cached token if it is still valid.
    pub fn current(&self) -> Option<String> {
        let now = self.clock.now();
        self.lock()
            .as_ref()
            .filter(|cached| now < cached.expires_at)
            .map(|cached| cached.value.clone())
    }

    /// Return the cached token, or call `issue` for a new one and store it.
    pub fn get_or_refresh<F>(&self, issue: F) -> Result<String>
    where
        F: FnOnce() -> Result<IssuedToken>,
    {
        if let Some(token) = self.current() {
            return Ok(token);
        }

        debug!("Access token missing or expired, requesting a new one");
        let issued = issue()?;
        let expires_at = self.clock.now() + issued.expires_in.saturating_sub(EXPIRY_MARGIN);

        *self.lock() = Some(CachedToken {
            value: issued.access_token.clone(),
            expires_at,
        });
        Ok(issued.access_token)
    }

    /// Drop the cached token so the next call refreshes.
    pub fn invalidate(&self) {
        debug!("Invalidating cached access token");
        *self.lock() = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::Arc;

    /// Manually advanced clock.
    #[derive(Clone)]
    struct FakeClock {
        now: Arc<Mutex<Instant>>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                now: Arc::new(Mutex::new(Instant::now())),
            }
        }

        fn advance(&self, by: Duration) {
            *self.now.lock().unwrap() += by;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    fn issue(name: &str, secs: u64) -> Result<IssuedToken> {
        Ok(IssuedToken {
            access_token: name.to_string(),
            expires_in: Duration::from_secs(secs),
        })
    }

    #[test]
    fn test_token_is_reused_until_expiry_margin() {
        let clock = FakeClock::new();
        let cache = TokenCache::new(clock.clone());
        let calls = Cell::new(0);
        let counted = |name: &str| {
            calls.set(calls.get() + 1);
            issue(name, 3600)
        };

        assert_eq!(cache.get_or_refresh(|| counted("first")).unwrap(), "first");
        clock.advance(Duration::from_secs(3000));
        assert_eq!(cache.get_or_refresh(|| counted("second")).unwrap(), "first");
        assert_eq!(calls.get(), 1);

        // 3600 - 60 = 3540 seconds of usable life.
        clock.advance(Duration::from_secs(540));
        assert_eq!(cache.get_or_refresh(|| counted("second")).unwrap(), "second");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_invalidate_forces_refresh() {
        let cache = TokenCache::new(FakeClock::new());
        cache.get_or_refresh(|| issue("a", 3600)).unwrap();
        assert_eq!(cache.current().as_deref(), Some("a"));

        cache.invalidate();
        assert_eq!(cache.current(), None);
        assert_eq!(cache.get_or_refresh(|| issue("b", 3600)).unwrap(), "b");
    }

    #[test]
    fn test_failed_refresh_leaves_cache_empty() {
        let cache = TokenCache::new(FakeClock::new());
        let result = cache.get_or_refresh(|| anyhow::bail!("auth server down"));
        assert!(result.is_err());
        assert_eq!(cache.current(), None);
    }

    #[test]
    fn test_short_lived_token_is_immediately_stale() {
        let cache = TokenCache::new(FakeClock::new());
        assert_eq!(cache.get_or_refresh(|| issue("tiny", 30)).unwrap(), "tiny");
        assert_eq!(cache.current(), None);
    }

    #[test]
    fn test_concurrent_refreshes_keep_a_valid_token() {
        let cache = Arc::new(TokenCache::default());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.get_or_refresh(|| issue(&format!("t{i}"), 3600)).unwrap())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap().starts_with('t'));
        }
        assert!(cache.current().unwrap().starts_with('t'));
    }
}
