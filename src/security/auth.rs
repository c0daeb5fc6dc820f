//! Login flow: lockout gate, PBKDF2 check, session issue.
//!
//! [`Authenticator`] is the one service instance the rest of the application
//! holds. It owns the attempt counters and the session, so callers can only
//! observe them through the methods below.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::audit::{AuditAction, AuditLog};
use super::clock::{SharedClock, SystemClock};
use super::credential::PasswordVerifier;
use super::error::{AuthError, DerivationError};
use super::rate_limit::{FailureOutcome, RateLimitInfo, RateLimitPolicy, RateLimiter};
use super::session::{ExpiryReason, LogoutHook, SessionInfo, SessionManager, SessionPolicy};

/// Outcome of [`Authenticator::verify_password`] as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResult {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }
}

impl From<AuthError> for VerifyResult {
    fn from(err: AuthError) -> Self {
        Self {
            success: false,
            error: Some(err.to_string()),
        }
    }
}

pub struct Authenticator {
    credentials: Arc<dyn PasswordVerifier>,
    limiter: RateLimiter,
    sessions: SessionManager,
    audit: Option<AuditLog>,
    /// Caller's notification, run after the expiry is audited.
    logout_hook: Arc<Mutex<Option<LogoutHook>>>,
}

impl Authenticator {
    pub fn new(
        credentials: impl PasswordVerifier + 'static,
        rate_limit: RateLimitPolicy,
        session: SessionPolicy,
    ) -> Self {
        Self::with_clock(credentials, rate_limit, session, Arc::new(SystemClock))
    }

    pub fn with_clock(
        credentials: impl PasswordVerifier + 'static,
        rate_limit: RateLimitPolicy,
        session: SessionPolicy,
        clock: SharedClock,
    ) -> Self {
        let auth = Self {
            credentials: Arc::new(credentials),
            limiter: RateLimiter::new(rate_limit, Arc::clone(&clock)),
            sessions: SessionManager::new(session, clock),
            audit: None,
            logout_hook: Arc::new(Mutex::new(None)),
        };
        auth.install_expiry_hook();
        auth
    }

    /// Record login and session events in the security audit log.
    ///
    /// A logout hook registered before this call is kept.
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self.install_expiry_hook();
        self
    }

    /// Register the caller's logout notification, replacing any earlier one.
    ///
    /// Expiry events are also written to the audit log when one is attached.
    pub fn set_logout_hook<F>(&self, hook: F)
    where
        F: Fn(ExpiryReason) + Send + Sync + 'static,
    {
        *self.logout_hook.lock() = Some(Arc::new(hook));
    }

    fn install_expiry_hook(&self) {
        let audit = self.audit.clone();
        let user_hook = Arc::clone(&self.logout_hook);
        self.sessions.set_logout_hook(move |reason| {
            if let Some(ref audit) = audit {
                audit.record(AuditAction::SessionExpired, Some(&reason.to_string()));
            }
            let hook = user_hook.lock().clone();
            if let Some(hook) = hook {
                hook(reason);
            }
        });
    }

    /// Check `password` against the configured credential.
    ///
    /// On success the failure counter is cleared and a session is started.
    pub async fn verify_password(&self, password: &str) -> VerifyResult {
        match self.try_verify(password).await {
            Ok(()) => VerifyResult::ok(),
            Err(err) => err.into(),
        }
    }

    /// Same as [`verify_password`](Self::verify_password) with the typed error.
    pub async fn try_verify(&self, password: &str) -> Result<(), AuthError> {
        // Authoritative gate: no derivation while locked out.
        if let Err(err) = self.limiter.check() {
            debug!("Login refused, lockout active");
            return Err(err);
        }

        let matched = match self.derive_and_compare(password).await {
            Ok(matched) => matched,
            Err(e) => {
                error!("Credential derivation failed: {}", e);
                return Err(AuthError::DerivationFailure);
            }
        };

        if matched {
            self.limiter.record_success();
            self.sessions.start_session();
            info!("Admin login succeeded");
            self.audit(AuditAction::LoginSucceeded, None);
            self.audit(AuditAction::SessionStarted, None);
            return Ok(());
        }

        match self.limiter.record_failure() {
            FailureOutcome::Remaining(attempts_left) => {
                warn!(attempts_left, "Admin login failed");
                self.audit(
                    AuditAction::LoginFailed,
                    Some(&format!("{attempts_left} attempts left")),
                );
                Err(AuthError::InvalidCredential {
                    attempts_left,
                    locked_for: None,
                })
            }
            FailureOutcome::LockedOut(window) => {
                self.audit(
                    AuditAction::LockedOut,
                    Some(&format!("{} seconds", window.as_secs())),
                );
                Err(AuthError::InvalidCredential {
                    attempts_left: 0,
                    locked_for: Some(window),
                })
            }
            FailureOutcome::AlreadyLocked => {
                // A lockout started while this attempt was deriving.
                Err(self.limiter.check().err().unwrap_or(AuthError::InvalidCredential {
                    attempts_left: 0,
                    locked_for: None,
                }))
            }
        }
    }

    pub fn rate_limit_info(&self) -> RateLimitInfo {
        self.limiter.status()
    }

    pub fn start_session(&self) -> String {
        let token = self.sessions.start_session();
        self.audit(AuditAction::SessionStarted, None);
        token
    }

    pub fn is_session_valid(&self) -> bool {
        self.sessions.is_session_valid()
    }

    pub fn record_activity(&self) -> bool {
        self.sessions.record_activity()
    }

    pub fn destroy_session(&self) {
        if self.sessions.token().is_some() {
            self.audit(AuditAction::SessionDestroyed, None);
        }
        self.sessions.destroy_session();
    }

    pub fn session_info(&self) -> Option<SessionInfo> {
        self.sessions.info()
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    async fn derive_and_compare(&self, password: &str) -> Result<bool, DerivationError> {
        let credentials = Arc::clone(&self.credentials);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || credentials.matches(&password)).await?
    }

    fn audit(&self, action: AuditAction, detail: Option<&str>) {
        if let Some(ref audit) = self.audit {
            audit.record(action, detail);
        }
    }
}
