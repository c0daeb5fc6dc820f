//! Consecutive-failure lockout for the admin credential.
//!
//! One process-wide [`AttemptState`] guarded by a mutex. Concurrent login
//! attempts serialize on it, so a burst of parallel guesses cannot lose an
//! increment and slip past the lockout.

use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::warn;

use super::clock::SharedClock;
use super::error::AuthError;

/// Default number of consecutive failures before lockout.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default lockout window (5 minutes).
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(5 * 60);

/// Lockout configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub lockout: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lockout: DEFAULT_LOCKOUT,
        }
    }
}

/// Mutable attempt counters.
#[derive(Debug, Default)]
struct AttemptState {
    failed_count: u32,
    lockout_until: Option<Instant>,
}

impl AttemptState {
    fn locked_until(&self, now: Instant) -> Option<Instant> {
        self.lockout_until.filter(|until| now < *until)
    }
}

/// Snapshot for UI code that wants to disable the login form ahead of time.
///
/// Never use this for the gating decision itself; the verifier checks again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub locked: bool,
    pub remaining_seconds: u64,
    pub attempts_left: u32,
}

/// What happened when a failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still below the limit.
    Remaining(u32),
    /// This failure started a lockout window of the given length.
    LockedOut(Duration),
    /// A lockout was already active (an attempt that was in flight when it
    /// started). The counter is left alone.
    AlreadyLocked,
}

pub struct RateLimiter {
    policy: RateLimitPolicy,
    clock: SharedClock,
    state: Mutex<AttemptState>,
}

impl RateLimiter {
    pub fn new(policy: RateLimitPolicy, clock: SharedClock) -> Self {
        Self {
            policy,
            clock,
            state: Mutex::new(AttemptState::default()),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Side-effect free view of the current state.
    pub fn status(&self) -> RateLimitInfo {
        let now = self.clock.now();
        let state = self.state.lock();

        match state.locked_until(now) {
            Some(until) => RateLimitInfo {
                locked: true,
                remaining_seconds: ceil_secs(until - now),
                attempts_left: 0,
            },
            None => RateLimitInfo {
                locked: false,
                remaining_seconds: 0,
                attempts_left: self.policy.max_attempts.saturating_sub(state.failed_count),
            },
        }
    }

    /// Authoritative gate. Returns `RateLimited` while a lockout is active.
    pub fn check(&self) -> Result<(), AuthError> {
        let now = self.clock.now();
        let state = self.state.lock();
        match state.locked_until(now) {
            Some(until) => Err(AuthError::RateLimited {
                remaining_secs: ceil_secs(until - now),
            }),
            None => Ok(()),
        }
    }

    pub fn record_failure(&self) -> FailureOutcome {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.locked_until(now).is_some() {
            return FailureOutcome::AlreadyLocked;
        }

        state.failed_count += 1;
        if state.failed_count >= self.policy.max_attempts {
            let until = now + self.policy.lockout;
            // Never move the window backwards.
            state.lockout_until = Some(match state.lockout_until {
                Some(existing) if existing > until => existing,
                _ => until,
            });
            state.failed_count = 0;
            warn!(
                max_attempts = self.policy.max_attempts,
                lockout_secs = self.policy.lockout.as_secs(),
                "Too many failed login attempts, locking out"
            );
            return FailureOutcome::LockedOut(self.policy.lockout);
        }

        FailureOutcome::Remaining(self.policy.max_attempts - state.failed_count)
    }

    pub fn record_success(&self) {
        self.state.lock().failed_count = 0;
    }
}

/// Whole seconds, rounded up, so "0 seconds" is never shown while locked.
fn ceil_secs(d: Duration) -> u64 {
    d.as_millis().div_ceil(1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::clock::ManualClock;
    use std::sync::Arc;

    fn limiter(max: u32, lockout_secs: u64) -> (RateLimiter, ManualClock) {
        let clock = ManualClock::new();
        let policy = RateLimitPolicy {
            max_attempts: max,
            lockout: Duration::from_secs(lockout_secs),
        };
        (RateLimiter::new(policy, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn fresh_limiter_is_open() {
        let (limiter, _) = limiter(5, 300);
        assert_eq!(
            limiter.status(),
            RateLimitInfo {
                locked: false,
                remaining_seconds: 0,
                attempts_left: 5,
            }
        );
        assert!(limiter.check().is_ok());
    }

    #[test]
    fn lockout_after_max_failures() {
        let (limiter, _) = limiter(3, 300);

        assert_eq!(limiter.record_failure(), FailureOutcome::Remaining(2));
        assert_eq!(limiter.record_failure(), FailureOutcome::Remaining(1));
        assert_eq!(
            limiter.record_failure(),
            FailureOutcome::LockedOut(Duration::from_secs(300))
        );

        let info = limiter.status();
        assert!(info.locked);
        assert_eq!(info.remaining_seconds, 300);
        assert_eq!(info.attempts_left, 0);
        assert_eq!(
            limiter.check(),
            Err(AuthError::RateLimited {
                remaining_secs: 300
            })
        );
    }

    #[test]
    fn lockout_expires_and_counter_starts_over() {
        let (limiter, clock) = limiter(2, 60);
        limiter.record_failure();
        limiter.record_failure();
        assert!(limiter.check().is_err());

        clock.advance(Duration::from_secs(59));
        assert_eq!(limiter.status().remaining_seconds, 1);

        clock.advance(Duration::from_secs(1));
        assert!(limiter.check().is_ok());
        // Counter was reset when the lockout started.
        assert_eq!(limiter.status().attempts_left, 2);
    }

    #[test]
    fn remaining_seconds_round_up() {
        let (limiter, clock) = limiter(1, 10);
        limiter.record_failure();
        clock.advance(Duration::from_millis(9_500));
        assert_eq!(limiter.status().remaining_seconds, 1);
    }

    #[test]
    fn success_clears_failures() {
        let (limiter, _) = limiter(5, 300);
        limiter.record_failure();
        limiter.record_failure();
        assert_eq!(limiter.status().attempts_left, 3);

        limiter.record_success();
        assert_eq!(limiter.status().attempts_left, 5);
    }

    #[test]
    fn failures_during_lockout_do_not_count() {
        let (limiter, _) = limiter(2, 300);
        limiter.record_failure();
        limiter.record_failure();

        assert_eq!(limiter.record_failure(), FailureOutcome::AlreadyLocked);
        let info = limiter.status();
        assert!(info.locked);
        assert_eq!(info.remaining_seconds, 300);
    }

    #[test]
    fn concurrent_failures_are_not_lost() {
        let (limiter, _) = limiter(1000, 300);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        limiter.record_failure();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(limiter.status().attempts_left, 200);
    }
}
