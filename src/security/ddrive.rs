//! # D-Drive Security Core
//!
//! Front door for the admin authentication and data integrity layer.
//! Everything the application needs is re-exported here.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                 auth.rs: Authenticator (one instance)              │
//! │        lockout gate -> PBKDF2 check -> session on success          │
//! ├──────────────────┬──────────────────┬──────────────────────────────┤
//! │ credential.rs    │ rate_limit.rs    │ session.rs                   │
//! │ PBKDF2-HMAC,     │ failure counter, │ token, idle + absolute       │
//! │ constant-time eq │ lockout window   │ limits, monitor, logout hook │
//! ├──────────────────┴──────────────────┴──────────────────────────────┤
//! │ integrity.rs: <key> + <key>_checksum (SHA-256 of canonical JSON)   │
//! │ sanitize.rs / upload.rs: escaping, file names, image policy        │
//! │ audit.rs: hash-chained JSONL log of security events                │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! 1. **Lockout before work**: while locked out no key derivation runs,
//!    even for the correct password.
//!
//! 2. **Monotonic windows**: lockout and session limits are measured on a
//!    monotonic clock, so changing the system time does not move them.
//!
//! 3. **Expiry is observable once**: the logout hook fires exactly once per
//!    expiry, whether the monitor or an access check noticed it first.
//!    An explicit logout does not fire it.
//!
//! 4. **Tamper-evident, not tamper-proof**: the checksum lives next to the
//!    data. It catches accidental corruption and naive edits, not an
//!    attacker who rewrites both.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ddrive::security::{Authenticator, Credentials, RateLimitPolicy, SessionPolicy};
//!
//! let auth = Authenticator::new(credentials, RateLimitPolicy::default(), SessionPolicy::default());
//! auth.set_logout_hook(|reason| println!("Session ended: {reason}"));
//!
//! let result = auth.verify_password(&password).await;
//! if !result.success {
//!     eprintln!("{}", result.error.unwrap_or_default());
//! }
//! ```
//!
//! ## Threat Model
//!
//! | Threat | Defense |
//! |--------|---------|
//! | Online password guessing | Attempt counter + lockout window |
//! | Parallel guesses racing the counter | Counter behind a mutex |
//! | Timing the hash comparison | Constant-time equality |
//! | Offline cracking of the stored hash | PBKDF2, 600k iterations, random salt |
//! | Unattended admin console | Inactivity + absolute session limits |
//! | Edited data files | SHA-256 checksum, audit entry |
//! | Markup injection via captions/tags | Entity escaping |
//! | Path tricks in uploaded names | File name normalization |

// ── Authentication ──────────────────────────────────────────────────

pub use super::auth::{Authenticator, VerifyResult};

pub use super::credential::{
    Credentials, DEFAULT_ITERATIONS, DERIVED_KEY_LEN, HashAlgorithm, PasswordVerifier, SALT_LEN,
    constant_time_eq, derive_hex, generate_salt,
};

pub use super::rate_limit::{
    DEFAULT_LOCKOUT, DEFAULT_MAX_ATTEMPTS, FailureOutcome, RateLimitInfo, RateLimitPolicy,
    RateLimiter,
};

// ── Sessions ────────────────────────────────────────────────────────

pub use super::session::{
    DEFAULT_ABSOLUTE_TIMEOUT, DEFAULT_CHECK_INTERVAL, DEFAULT_INACTIVITY_TIMEOUT, ExpiryReason,
    LogoutHook, SessionInfo, SessionManager, SessionPolicy,
};

pub use super::clock::{Clock, ManualClock, SharedClock, SystemClock};

// ── Integrity ───────────────────────────────────────────────────────

pub use super::integrity::{
    CHECKSUM_SUFFIX, IntegrityStore, Loaded, checksum_key, compute_checksum,
};

// ── Input Handling ──────────────────────────────────────────────────

pub use super::sanitize::{
    DEFAULT_FILE_NAME, MAX_FILE_NAME_LEN, MAX_TAG_LEN, MAX_TAGS, sanitize_file_name,
    sanitize_json_file_name, sanitize_json_tags, sanitize_json_text, sanitize_tags,
    sanitize_text,
};

pub use super::upload::{
    DEFAULT_EXTENSIONS, DEFAULT_MAX_BYTES, DEFAULT_MIME_TYPES, ImageMeta, UploadPolicy,
    ValidationReport, validate_image_file,
};

// ── Audit Log ───────────────────────────────────────────────────────

pub use super::audit::{AUDIT_FILENAME, AuditAction, AuditEntry, AuditLog};

// ── Errors ──────────────────────────────────────────────────────────

pub use super::error::{AuthError, DerivationError, IntegrityError, ValidationError};
