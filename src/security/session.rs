//! Privileged admin session.
//!
//! At most one session is live at a time. It lives in process memory only,
//! which is the session scope: nothing about it is written to disk, so it
//! never outlives the running program.
//!
//! Expiry is detected two ways:
//!
//! - lazily, whenever [`SessionManager::is_session_valid`] or
//!   [`SessionManager::record_activity`] runs;
//! - proactively, by a monitor task spawned on the current Tokio runtime
//!   that re-checks on a fixed interval.
//!
//! Whichever path observes the expiry first takes the session out of the
//! state under the lock, so the logout hook fires exactly once per expiry.
//! An explicit [`SessionManager::destroy_session`] is a logout, not an
//! expiry, and does not fire the hook.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::RngExt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::clock::SharedClock;

/// Default idle limit (30 minutes).
pub const DEFAULT_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Default absolute session length (4 hours).
pub const DEFAULT_ABSOLUTE_TIMEOUT: Duration = Duration::from_secs(4 * 60 * 60);

/// Default monitor interval (60 seconds).
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Random bytes per session token (256 bits).
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub inactivity_timeout: Duration,
    pub absolute_timeout: Duration,
    pub check_interval: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            inactivity_timeout: DEFAULT_INACTIVITY_TIMEOUT,
            absolute_timeout: DEFAULT_ABSOLUTE_TIMEOUT,
            check_interval: DEFAULT_CHECK_INTERVAL,
        }
    }
}

/// Which bound ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryReason {
    Inactivity,
    AbsoluteLimit,
}

impl std::fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExpiryReason::Inactivity => f.write_str("inactivity timeout"),
            ExpiryReason::AbsoluteLimit => f.write_str("maximum session length reached"),
        }
    }
}

/// Callback invoked once when a live session expires.
pub type LogoutHook = Arc<dyn Fn(ExpiryReason) + Send + Sync>;

struct Session {
    token: String,
    started_at: Instant,
    last_activity: Instant,
    started_wall: DateTime<Utc>,
}

impl Session {
    fn expiry(&self, now: Instant, policy: &SessionPolicy) -> Option<ExpiryReason> {
        if now.saturating_duration_since(self.last_activity) > policy.inactivity_timeout {
            Some(ExpiryReason::Inactivity)
        } else if now.saturating_duration_since(self.started_at) > policy.absolute_timeout {
            Some(ExpiryReason::AbsoluteLimit)
        } else {
            None
        }
    }
}

#[derive(Default)]
struct SessionState {
    current: Option<Session>,
    monitor: Option<AbortHandle>,
}

impl SessionState {
    /// Remove the session and stop its monitor.
    fn clear(&mut self) -> bool {
        if let Some(monitor) = self.monitor.take() {
            monitor.abort();
        }
        self.current.take().is_some()
    }
}

struct Inner {
    policy: SessionPolicy,
    clock: SharedClock,
    hook: Mutex<Option<LogoutHook>>,
    state: Mutex<SessionState>,
}

/// Read-only view of the live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub started_at: DateTime<Utc>,
    pub idle: Duration,
    /// Time until the nearer of the two bounds is crossed.
    pub expires_in: Duration,
}

/// Owner of the single admin session. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(policy: SessionPolicy, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                clock,
                hook: Mutex::new(None),
                state: Mutex::new(SessionState::default()),
            }),
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.inner.policy
    }

    /// Register the callback fired when a session lapses.
    pub fn set_logout_hook<F>(&self, hook: F)
    where
        F: Fn(ExpiryReason) + Send + Sync + 'static,
    {
        *self.inner.hook.lock() = Some(Arc::new(hook));
    }

    /// Issue a new session, replacing any existing one.
    ///
    /// Returns the opaque token. If called inside a Tokio runtime, a monitor
    /// task is started; otherwise expiry is only detected lazily.
    pub fn start_session(&self) -> String {
        let now = self.inner.clock.now();
        let token = generate_token();

        let mut state = self.inner.state.lock();
        state.clear();
        state.current = Some(Session {
            token: token.clone(),
            started_at: now,
            last_activity: now,
            started_wall: Utc::now(),
        });
        state.monitor = self.spawn_monitor();
        drop(state);

        info!("Admin session started");
        token
    }

    /// True while the session is inside both bounds.
    ///
    /// An expired session is destroyed here as a side effect.
    pub fn is_session_valid(&self) -> bool {
        self.expire_if_due().is_ok()
    }

    /// Mark user interaction. Returns false if there is no live session.
    ///
    /// An already-lapsed session is expired rather than revived.
    pub fn record_activity(&self) -> bool {
        let now = self.inner.clock.now();
        if self.expire_if_due().is_err() {
            return false;
        }
        let mut state = self.inner.state.lock();
        match state.current.as_mut() {
            Some(session) => {
                session.last_activity = now;
                true
            }
            None => false,
        }
    }

    /// Log out. Idempotent; does not fire the logout hook.
    pub fn destroy_session(&self) {
        if self.inner.state.lock().clear() {
            info!("Admin session destroyed");
        }
    }

    /// Token of the live session, if any. Does not check expiry.
    pub fn token(&self) -> Option<String> {
        self.inner
            .state
            .lock()
            .current
            .as_ref()
            .map(|s| s.token.clone())
    }

    /// Snapshot of the live session after an expiry check.
    pub fn info(&self) -> Option<SessionInfo> {
        if self.expire_if_due().is_err() {
            return None;
        }
        let now = self.inner.clock.now();
        let policy = &self.inner.policy;
        let state = self.inner.state.lock();
        state.current.as_ref().map(|s| {
            let idle = now.saturating_duration_since(s.last_activity);
            let age = now.saturating_duration_since(s.started_at);
            let expires_in = policy
                .inactivity_timeout
                .saturating_sub(idle)
                .min(policy.absolute_timeout.saturating_sub(age));
            SessionInfo {
                started_at: s.started_wall,
                idle,
                expires_in,
            }
        })
    }

    /// Ok if a session is live; Err(None) if there is none;
    /// Err(Some(reason)) if this call expired it.
    fn expire_if_due(&self) -> Result<(), Option<ExpiryReason>> {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();

        let reason = match state.current.as_ref() {
            None => return Err(None),
            Some(session) => match session.expiry(now, &self.inner.policy) {
                None => return Ok(()),
                Some(reason) => reason,
            },
        };
        state.clear();
        drop(state);

        info!(?reason, "Admin session expired");
        let hook = self.inner.hook.lock().clone();
        if let Some(hook) = hook {
            hook(reason);
        }
        Err(Some(reason))
    }

    fn spawn_monitor(&self) -> Option<AbortHandle> {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                debug!("No async runtime, session expiry will be checked lazily");
                return None;
            }
        };
        let weak = Arc::downgrade(&self.inner);
        let interval = self.inner.policy.check_interval;
        let task = handle.spawn(monitor_loop(weak, interval));
        Some(task.abort_handle())
    }
}

async fn monitor_loop(inner: Weak<Inner>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let manager = SessionManager { inner };
        if !manager.is_session_valid() {
            debug!("Session monitor stopping");
            break;
        }
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}
