//! Error types for the authentication and integrity core.
//!
//! Nothing in here is fatal. Authentication failures are folded into a
//! [`VerifyResult`](super::VerifyResult) with a user-facing message,
//! integrity mismatches travel as a flag next to the data, and upload
//! violations are collected into a full report.

use std::time::Duration;
use thiserror::Error;

/// Why a credential check did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// A lockout window is active. No derivation was attempted.
    #[error("Too many attempts. Locked out for {remaining_secs} seconds.")]
    RateLimited { remaining_secs: u64 },

    /// The derived digest did not match the reference hash.
    ///
    /// `locked_for` is set when this failure used up the last attempt and
    /// started a new lockout window.
    #[error("{}", invalid_credential_message(*attempts_left, *locked_for))]
    InvalidCredential {
        attempts_left: u32,
        locked_for: Option<Duration>,
    },

    /// The key derivation backend failed. The detail is logged, never shown.
    #[error("Authentication error. Try again.")]
    DerivationFailure,
}

impl AuthError {
    /// True if this error means login is currently refused outright.
    pub fn is_locked_out(&self) -> bool {
        matches!(
            self,
            AuthError::RateLimited { .. }
                | AuthError::InvalidCredential {
                    locked_for: Some(_),
                    ..
                }
        )
    }
}

fn invalid_credential_message(attempts_left: u32, locked_for: Option<Duration>) -> String {
    match locked_for {
        Some(window) => format!(
            "Too many failed attempts. Locked out for {}.",
            human_window(window)
        ),
        None => format!("Incorrect password. {attempts_left} attempts remaining."),
    }
}

/// Render a lockout window the way the login prompt shows it.
pub(crate) fn human_window(window: Duration) -> String {
    let secs = window.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        let minutes = secs / 60;
        if minutes == 1 {
            "1 minute".to_string()
        } else {
            format!("{minutes} minutes")
        }
    } else {
        format!("{secs} seconds")
    }
}

/// Failure inside the PBKDF2 step. Only ever logged.
#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("invalid derived key length ({0} bytes)")]
    InvalidLength(usize),

    #[error("derivation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Integrity store failures.
#[derive(Debug, Error)]
pub enum IntegrityError {
    /// Recomputed digest differs from the stored one.
    ///
    /// Only produced by [`Loaded::verified`](super::Loaded::verified); a plain
    /// load reports the mismatch through its `valid` flag instead.
    #[error("Data integrity check failed for \"{key}\". Data may have been tampered with.")]
    ChecksumMismatch { key: String },

    /// The persisted bytes are not valid JSON or not the expected shape.
    #[error("Stored value for \"{key}\" is malformed: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize value for \"{key}\": {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Storage error for \"{key}\": {source}")]
    Storage {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// A single upload policy violation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid file type: {mime_type}. Only images are allowed.")]
    BadType { mime_type: String },

    #[error("File too large: {:.1}MB. Max is {}MB.", mib(*size), mib_whole(*max))]
    BadSize { size: u64, max: u64 },

    #[error("Invalid file extension: {extension}")]
    BadExtension { extension: String },
}

fn mib(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}

fn mib_whole(bytes: u64) -> u64 {
    bytes / (1024 * 1024)
}
