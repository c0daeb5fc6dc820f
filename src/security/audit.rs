//! Append-only, hash-chained security audit log.
//!
//! Stored at `<state_dir>/ddrive.audit.jsonl`. Each entry carries the
//! SHA-256 of the previous line, so editing or deleting a line breaks the
//! chain at the next one.
//!
//! # Format
//!
//! One JSON object per line (JSONL):
//!
//! | Field | Description |
//! |-------|-------------|
//! | `ts` | RFC 3339 timestamp |
//! | `action` | `login_failed`, `locked_out`, `tamper_detected`, ... |
//! | `prev_entry_sha256` | SHA-256 of the previous JSONL line |
//! | `source` | Who wrote it: `auth`, `session`, `integrity`, `audit_system` |
//! | `detail` | Optional free text |
//!
//! The first entry uses 64 zeros as `prev_entry_sha256`.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use tracing::warn;

pub const AUDIT_FILENAME: &str = "ddrive.audit.jsonl";

/// `prev_entry_sha256` of the first entry in a chain.
const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Append locks keyed by absolute log path, shared by every handle in the
/// process.
static APPEND_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(Default::default);

fn append_lock_for(path: &Path) -> Arc<Mutex<()>> {
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    Arc::clone(APPEND_LOCKS.lock().entry(key).or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub ts: String,
    pub action: AuditAction,
    pub prev_entry_sha256: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Security events recorded in the audit log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    LoginSucceeded,
    LoginFailed,
    /// The failure that crossed the attempt limit.
    LockedOut,
    SessionStarted,
    /// Inactivity or absolute limit reached.
    SessionExpired,
    /// Explicit logout.
    SessionDestroyed,
    /// Stored data did not match its checksum.
    TamperDetected,
    /// Previous audit line was corrupted; a new chain segment starts here.
    ChainRecovery,
}

impl AuditAction {
    fn source(self) -> &'static str {
        match self {
            AuditAction::LoginSucceeded | AuditAction::LoginFailed | AuditAction::LockedOut => {
                "auth"
            }
            AuditAction::SessionStarted
            | AuditAction::SessionExpired
            | AuditAction::SessionDestroyed => "session",
            AuditAction::TamperDetected => "integrity",
            AuditAction::ChainRecovery => "audit_system",
        }
    }
}

/// Handle to the audit log file.
///
/// All handles on the same path share one append lock, so entries written
/// from several tasks or threads still chain in order.
#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
    append_lock: Arc<Mutex<()>>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            append_lock: append_lock_for(&path),
            path,
        }
    }

    /// Audit log inside `state_dir`.
    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(AUDIT_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry, logging instead of failing.
    ///
    /// Used from the login and session paths, which must not fail because
    /// the audit file is unwritable.
    pub fn record(&self, action: AuditAction, detail: Option<&str>) {
        if let Err(e) = self.append(action, detail) {
            warn!("Failed to write audit entry {:?}: {:#}", action, e);
        }
    }

    /// Append a new entry.
    ///
    /// If the last line is not valid JSON, a `ChainRecovery` entry is
    /// written first to mark the break.
    pub fn append(&self, action: AuditAction, detail: Option<&str>) -> Result<()> {
        let _guard = self.append_lock.lock();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let prev_hash = match self.last_line()? {
            Some(last) if serde_json::from_str::<AuditEntry>(&last).is_ok() => {
                sha256_hex(last.as_bytes())
            }
            Some(last) => {
                let recovery = new_entry(
                    AuditAction::ChainRecovery,
                    sha256_hex(last.as_bytes()),
                    Some(format!(
                        "Previous entry corrupted ({} bytes), new chain segment",
                        last.len()
                    )),
                );
                let recovery_json = serde_json::to_string(&recovery)
                    .context("Failed to serialize recovery entry")?;
                self.append_line(&recovery_json)?;
                sha256_hex(recovery_json.as_bytes())
            }
            None => GENESIS_HASH.to_string(),
        };

        let entry = new_entry(action, prev_hash, detail.map(str::to_string));
        let json = serde_json::to_string(&entry).context("Failed to serialize audit entry")?;
        self.append_line(&json)
    }

    /// All parseable entries. Corrupted lines are skipped.
    pub fn read(&self) -> Result<Vec<AuditEntry>> {
        Ok(self
            .lines()?
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    /// Indices of lines whose chain link is broken. Empty means intact.
    pub fn verify_chain(&self) -> Result<Vec<usize>> {
        let lines = self.lines()?;
        let mut broken = Vec::new();

        for (i, line) in lines.iter().enumerate() {
            let Ok(entry) = serde_json::from_str::<AuditEntry>(line) else {
                broken.push(i);
                continue;
            };
            let expected = match i {
                0 => GENESIS_HASH.to_string(),
                _ => sha256_hex(lines[i - 1].as_bytes()),
            };
            if entry.prev_entry_sha256 != expected {
                broken.push(i);
            }
        }

        Ok(broken)
    }

    fn lines(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).context("Failed to read audit log")?;
        Ok(content
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn last_line(&self) -> Result<Option<String>> {
        Ok(self.lines()?.pop())
    }

    fn append_line(&self, line: &str) -> Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open audit log")?;
        writeln!(file, "{}", line).context("Failed to write audit entry")?;
        Ok(())
    }
}

fn new_entry(action: AuditAction, prev_entry_sha256: String, detail: Option<String>) -> AuditEntry {
    AuditEntry {
        ts: chrono::Utc::now().to_rfc3339(),
        action,
        prev_entry_sha256,
        source: action.source().to_string(),
        detail,
    }
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
