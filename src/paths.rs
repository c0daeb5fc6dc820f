//! XDG Base Directory Specification compliant path resolution.
//!
//! Every directory is resolved through a three-level fallback:
//! 1. D-Drive specific env var (DDRIVE_CONFIG_DIR, etc.)
//! 2. XDG env var (XDG_CONFIG_HOME, etc.) via `etcetera`
//! 3. Platform default (~/.config, etc.)
//!
//! All paths are absolute. Relative paths from env vars are ignored per XDG spec.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::security::AUDIT_FILENAME;

const APP_DIR: &str = "ddrive";

/// Resolved directory paths for the entire application.
///
/// Created once at startup, threaded through Config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Config directory: config.toml lives here
    pub config_dir: PathBuf,

    /// Data directory root: contains store/ (photo and album data)
    pub data_dir: PathBuf,

    /// State directory: audit log
    pub state_dir: PathBuf,
}

impl Paths {
    /// Resolve all paths using real environment variables.
    pub fn resolve() -> Result<Self> {
        Self::resolve_with_env(|key| std::env::var(key))
    }

    /// Resolve paths with a custom env var lookup (for testing).
    pub fn resolve_with_env<F>(env_fn: F) -> Result<Self>
    where
        F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
    {
        use etcetera::BaseStrategy;

        let strategy = etcetera::choose_base_strategy()
            .map_err(|e| anyhow::anyhow!("Failed to determine base directories: {}", e))?;

        let config_dir = env_or(&env_fn, "DDRIVE_CONFIG_DIR", || {
            strategy.config_dir().join(APP_DIR)
        });

        let data_dir = env_or(&env_fn, "DDRIVE_DATA_DIR", || {
            strategy.data_dir().join(APP_DIR)
        });

        let state_dir = env_or(&env_fn, "DDRIVE_STATE_DIR", || {
            // state_dir() is None on platforms without XDG_STATE_HOME.
            let base_state = strategy.state_dir().unwrap_or_else(|| strategy.data_dir());
            base_state.join(APP_DIR)
        });

        Ok(Self {
            config_dir,
            data_dir,
            state_dir,
        })
    }

    /// All three directories under one root. Used by tests and `--config`
    /// setups that keep everything side by side.
    pub fn under(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            data_dir: root.join("data"),
            state_dir: root.join("state"),
        }
    }

    /// Config file: config_dir/config.toml
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Default checksummed key-value store: data_dir/store
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join("store")
    }

    /// Audit log: state_dir/ddrive.audit.jsonl
    pub fn audit_log(&self) -> PathBuf {
        self.state_dir.join(AUDIT_FILENAME)
    }

    /// Create all directories with appropriate permissions.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.config_dir, &self.data_dir, &self.state_dir] {
            create_dir_with_mode(dir)?;
        }
        Ok(())
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::resolve().unwrap_or_else(|_| {
            // Only reached when no home directory can be determined.
            let home = etcetera::home_dir().unwrap_or_else(|_| PathBuf::from("."));
            Self {
                config_dir: home.join(".config").join(APP_DIR),
                data_dir: home.join(".local").join("share").join(APP_DIR),
                state_dir: home.join(".local").join("state").join(APP_DIR),
            }
        })
    }
}

/// Resolve an env var with fallback. `~` is expanded; empty and relative
/// paths are ignored per XDG spec.
fn env_or<F>(env_fn: &F, var: &str, default: impl FnOnce() -> PathBuf) -> PathBuf
where
    F: Fn(&str) -> std::result::Result<String, std::env::VarError>,
{
    env_fn(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(|v| PathBuf::from(shellexpand::tilde(&v).into_owned()))
        .filter(|p| p.is_absolute())
        .unwrap_or_else(default)
}

/// Create a directory with mode 0700 per XDG spec.
pub(crate) fn create_dir_with_mode(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Helper: build an env_fn from a HashMap
    fn make_env(
        map: HashMap<&str, &str>,
    ) -> impl Fn(&str) -> std::result::Result<String, std::env::VarError> {
        move |key: &str| {
            map.get(key)
                .map(|v| v.to_string())
                .ok_or(std::env::VarError::NotPresent)
        }
    }

    #[test]
    fn default_paths_are_xdg_compliant() {
        let paths = Paths::resolve_with_env(make_env(HashMap::new())).unwrap();

        assert!(paths.config_dir.ends_with("ddrive"), "{:?}", paths.config_dir);
        assert!(paths.data_dir.ends_with("ddrive"), "{:?}", paths.data_dir);
        assert!(paths.state_dir.ends_with("ddrive"), "{:?}", paths.state_dir);
        assert!(paths.config_dir.is_absolute());
    }

    #[test]
    fn ddrive_env_vars_override_xdg() {
        let mut env: HashMap<&str, &str> = HashMap::new();
        env.insert("DDRIVE_CONFIG_DIR", "/custom/config");
        env.insert("DDRIVE_DATA_DIR", "/custom/data");
        env.insert("DDRIVE_STATE_DIR", "/custom/state");

        let paths = Paths::resolve_with_env(make_env(env)).unwrap();
        assert_eq!(paths.config_dir, PathBuf::from("/custom/config"));
        assert_eq!(paths.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(paths.state_dir, PathBuf::from("/custom/state"));
    }

    #[test]
    fn relative_and_empty_paths_are_ignored() {
        let mut env: HashMap<&str, &str> = HashMap::new();
        env.insert("DDRIVE_CONFIG_DIR", "relative/path");
        env.insert("DDRIVE_DATA_DIR", "  ");

        let paths = Paths::resolve_with_env(make_env(env)).unwrap();
        assert!(paths.config_dir.is_absolute());
        assert!(paths.config_dir.ends_with("ddrive"));
        assert!(paths.data_dir.ends_with("ddrive"));
    }

    #[test]
    fn convenience_accessors() {
        let paths = Paths::under(Path::new("/srv/ddrive"));

        assert_eq!(
            paths.config_file(),
            PathBuf::from("/srv/ddrive/config/config.toml")
        );
        assert_eq!(paths.store_dir(), PathBuf::from("/srv/ddrive/data/store"));
        assert_eq!(
            paths.audit_log(),
            PathBuf::from("/srv/ddrive/state/ddrive.audit.jsonl")
        );
    }

    #[test]
    fn ensure_dirs_creates_everything() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = Paths::under(tmp.path());
        paths.ensure_dirs().unwrap();

        assert!(paths.config_dir.is_dir());
        assert!(paths.data_dir.is_dir());
        assert!(paths.state_dir.is_dir());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&paths.state_dir)
                .unwrap()
                .permissions()
                .mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }
}
