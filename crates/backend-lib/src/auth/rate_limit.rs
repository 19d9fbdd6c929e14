// ============================
// crates/backend-lib/src/auth/rate_limit.rs
// ============================
//! Lockout after repeated failed sign-ins.

use crate::metrics::SIGN_IN_LOCKOUT;
use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Default number of failed attempts before lockout
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default lockout duration (5 minutes)
pub const DEFAULT_LOCKOUT_DURATION: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
struct RateLimitEntry {
    failed_attempts: u32,
    last_failure: Instant,
    lockout_expiry: Option<Instant>,
}

/// Per-key failure counter. Keys are whatever the caller throttles on,
/// normally the normalized identifier.
///
/// A streak that has not reached lockout is forgotten once `lockout_duration`
/// passes without another failure, so keys that fail once are not kept long.
#[derive(Debug, Clone)]
pub struct AuthRateLimiter {
    attempts: Arc<DashMap<String, RateLimitEntry>>,
    max_attempts: u32,
    lockout_duration: Duration,
}

impl Default for AuthRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_LOCKOUT_DURATION)
    }
}

impl AuthRateLimiter {
    pub fn new(max_attempts: u32, lockout_duration: Duration) -> Self {
        Self {
            attempts: Arc::new(DashMap::new()),
            max_attempts: max_attempts.max(1),
            lockout_duration,
        }
    }

    /// Record a failed attempt for `key`
    pub fn record_failed_attempt(&self, key: &str) {
        let now = Instant::now();

        let mut entry = self
            .attempts
            .entry(key.to_string())
            .or_insert_with(|| RateLimitEntry {
                failed_attempts: 0,
                last_failure: now,
                lockout_expiry: None,
            });

        // a served lockout or a stale streak starts afresh
        let stale = match entry.lockout_expiry {
            Some(expiry) => now >= expiry,
            None => self.is_stale(entry.last_failure, now),
        };
        if stale {
            entry.failed_attempts = 0;
            entry.lockout_expiry = None;
        }

        entry.failed_attempts += 1;
        entry.last_failure = now;

        if entry.failed_attempts >= self.max_attempts && entry.lockout_expiry.is_none() {
            entry.lockout_expiry = Some(now + self.lockout_duration);
            counter!(SIGN_IN_LOCKOUT).increment(1);
            warn!(
                key,
                attempts = entry.failed_attempts,
                lockout_secs = self.lockout_duration.as_secs(),
                "sign-in locked out"
            );
        }
    }

    /// Forget the failure streak for `key`
    pub fn record_success(&self, key: &str) {
        self.attempts.remove(key);
    }

    /// `false` while `key` is locked out
    pub fn check_rate_limit(&self, key: &str) -> bool {
        match self.attempts.get(key) {
            Some(entry) => entry
                .lockout_expiry
                .is_none_or(|expiry| Instant::now() >= expiry),
            None => true,
        }
    }

    /// Drop served lockouts and stale failure streaks
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.attempts.retain(|_, entry| match entry.lockout_expiry {
            Some(expiry) => now < expiry,
            None => !self.is_stale(entry.last_failure, now),
        });
    }

    fn is_stale(&self, last_failure: Instant, now: Instant) -> bool {
        now.duration_since(last_failure) >= self.lockout_duration
    }

    pub fn tracked_keys(&self) -> usize {
        self.attempts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lockout_after_max_attempts() {
        let limiter = AuthRateLimiter::new(3, Duration::from_secs(60));
        let key = "a@x.com";

        for _ in 0..2 {
            limiter.record_failed_attempt(key);
            assert!(limiter.check_rate_limit(key));
        }
        limiter.record_failed_attempt(key);
        assert!(!limiter.check_rate_limit(key));

        // other keys are unaffected
        assert!(limiter.check_rate_limit("b@x.com"));
    }

    #[test]
    fn test_success_resets_streak() {
        let limiter = AuthRateLimiter::new(2, Duration::from_secs(60));
        limiter.record_failed_attempt("a@x.com");
        limiter.record_success("a@x.com");
        limiter.record_failed_attempt("a@x.com");
        assert!(limiter.check_rate_limit("a@x.com"));
    }

    #[test]
    fn test_lockout_expires() {
        let limiter = AuthRateLimiter::new(1, Duration::from_millis(20));
        limiter.record_failed_attempt("a@x.com");
        assert!(!limiter.check_rate_limit("a@x.com"));

        std::thread::sleep(Duration::from_millis(40));
        assert!(limiter.check_rate_limit("a@x.com"));

        limiter.cleanup();
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_unlocked_streaks_are_short_lived() {
        let limiter = AuthRateLimiter::new(2, Duration::from_millis(20));
        for i in 0..50 {
            limiter.record_failed_attempt(&format!("nobody{i}@x.com"));
        }
        assert_eq!(limiter.tracked_keys(), 50);

        std::thread::sleep(Duration::from_millis(40));
        limiter.cleanup();
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_stale_streak_does_not_lock_out() {
        let limiter = AuthRateLimiter::new(2, Duration::from_millis(20));
        limiter.record_failed_attempt("a@x.com");
        std::thread::sleep(Duration::from_millis(40));

        // the earlier failure has aged out, so this one starts a new streak
        limiter.record_failed_attempt("a@x.com");
        assert!(limiter.check_rate_limit("a@x.com"));

        limiter.record_failed_attempt("a@x.com");
        assert!(!limiter.check_rate_limit("a@x.com"));
    }
}
