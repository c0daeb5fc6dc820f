use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::paths::Paths;
use crate::security::{
    Credentials, DEFAULT_EXTENSIONS, DEFAULT_ITERATIONS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_BYTES,
    DEFAULT_MIME_TYPES, HashAlgorithm, RateLimitPolicy, SessionPolicy, UploadPolicy,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Resolved XDG-compliant paths (not serialized)
    #[serde(skip)]
    pub paths: Paths,

    /// File this config was loaded from (not serialized)
    #[serde(skip)]
    pub config_file: PathBuf,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Hex PBKDF2 output for the admin password. Supports `${ENV}`.
    #[serde(default)]
    pub password_hash: String,

    /// Hex salt used for the derivation. Supports `${ENV}`.
    #[serde(default)]
    pub salt: String,

    #[serde(default = "default_iterations")]
    pub iterations: u32,

    #[serde(default)]
    pub algorithm: HashAlgorithm,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_lockout")]
    pub lockout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout: String,

    #[serde(default = "default_absolute_timeout")]
    pub absolute_timeout: String,

    #[serde(default = "default_check_interval")]
    pub check_interval: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    #[serde(default = "default_mime_types")]
    pub allowed_mime_types: Vec<String>,

    #[serde(default = "default_extensions")]
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store directory. Empty means `<data_dir>/store`.
    #[serde(default)]
    pub dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

/// Output format of the stderr log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    /// One JSON object per event, for log shippers.
    Json,
}

fn default_iterations() -> u32 {
    DEFAULT_ITERATIONS
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}
fn default_lockout() -> String {
    "5m".to_string()
}
fn default_inactivity_timeout() -> String {
    "30m".to_string()
}
fn default_absolute_timeout() -> String {
    "4h".to_string()
}
fn default_check_interval() -> String {
    "60s".to_string()
}
fn default_max_bytes() -> u64 {
    DEFAULT_MAX_BYTES
}
fn default_mime_types() -> Vec<String> {
    DEFAULT_MIME_TYPES.iter().map(|s| s.to_string()).collect()
}
fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_hash: String::new(),
            salt: String::new(),
            iterations: default_iterations(),
            algorithm: HashAlgorithm::default(),
            max_attempts: default_max_attempts(),
            lockout: default_lockout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_timeout: default_inactivity_timeout(),
            absolute_timeout: default_absolute_timeout(),
            check_interval: default_check_interval(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            allowed_mime_types: default_mime_types(),
            allowed_extensions: default_extensions(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Config {
    /// Load the config from `path`, or from the default location.
    ///
    /// The default file is created from a commented template on first run.
    /// An explicit path must already exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let paths = Paths::resolve()?;
        match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!(
                        "Config file not found: {} (run `ddrive config init`)",
                        path.display()
                    );
                }
                Self::load_from(path, paths)
            }
            None => {
                let path = paths.config_file();
                if !path.exists() {
                    paths.ensure_dirs()?;
                    write_template(&path)?;
                    eprintln!("Created default config at {}", path.display());
                }
                Self::load_from(&path, paths)
            }
        }
    }

    /// Parse `path` with already resolved directories.
    pub fn load_from(path: &Path, paths: Paths) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))?;
        config.paths = paths;
        config.config_file = path.to_path_buf();

        // Expand environment variables in secrets
        config.expand_env_vars();

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_file.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&self.config_file, content)
            .with_context(|| format!("Failed to write {}", self.config_file.display()))?;
        Ok(())
    }

    /// Write the commented template to `path`. Refuses to overwrite unless
    /// `force` is set.
    pub fn init(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                path.display()
            );
        }
        write_template(path)
    }

    pub fn config_path() -> Result<PathBuf> {
        let paths = Paths::resolve()?;
        Ok(paths.config_file())
    }

    fn expand_env_vars(&mut self) {
        self.auth.password_hash = expand_env(&self.auth.password_hash);
        self.auth.salt = expand_env(&self.auth.salt);
    }

    pub fn credentials(&self) -> Result<Credentials> {
        Credentials::from_hex(
            &self.auth.password_hash,
            &self.auth.salt,
            self.auth.iterations,
            self.auth.algorithm,
        )
        .with_context(|| format!("Invalid [auth] section in {}", self.config_file.display()))
    }

    pub fn rate_limit_policy(&self) -> Result<RateLimitPolicy> {
        if self.auth.max_attempts == 0 {
            anyhow::bail!("auth.max_attempts must be at least 1");
        }
        Ok(RateLimitPolicy {
            max_attempts: self.auth.max_attempts,
            lockout: parse_duration(&self.auth.lockout).context("auth.lockout")?,
        })
    }

    pub fn session_policy(&self) -> Result<SessionPolicy> {
        let policy = SessionPolicy {
            inactivity_timeout: parse_duration(&self.session.inactivity_timeout)
                .context("session.inactivity_timeout")?,
            absolute_timeout: parse_duration(&self.session.absolute_timeout)
                .context("session.absolute_timeout")?,
            check_interval: parse_duration(&self.session.check_interval)
                .context("session.check_interval")?,
        };
        if policy.check_interval.is_zero() {
            anyhow::bail!("session.check_interval must be greater than zero");
        }
        Ok(policy)
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy {
            max_bytes: self.upload.max_bytes,
            allowed_mime_types: self
                .upload
                .allowed_mime_types
                .iter()
                .map(|m| m.trim().to_ascii_lowercase())
                .collect(),
            allowed_extensions: self
                .upload
                .allowed_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
        }
    }

    /// Directory of the checksummed store.
    pub fn store_dir(&self) -> PathBuf {
        let dir = self.storage.dir.trim();
        if dir.is_empty() {
            self.paths.store_dir()
        } else {
            PathBuf::from(shellexpand::tilde(dir).into_owned())
        }
    }

    pub fn audit_log_path(&self) -> PathBuf {
        self.paths.audit_log()
    }
}

/// `jpg`, `.JPG` and ` .jpg` all become `.jpg`.
fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().trim_start_matches('.').to_lowercase();
    format!(".{ext}")
}

/// Parse a human duration such as `"90s"`, `"5m"`, `"4h"`, `"1h30m"` or
/// `"250ms"`. A bare number is seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let s = input.trim();
    if s.is_empty() {
        anyhow::bail!("empty duration");
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            anyhow::bail!("invalid duration {:?}: expected a number", input);
        }
        let value: u64 = rest[..digits]
            .parse()
            .with_context(|| format!("invalid duration {:?}", input))?;
        rest = &rest[digits..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(60 * 60)),
            "d" => Duration::from_secs(value.saturating_mul(24 * 60 * 60)),
            "" => anyhow::bail!("invalid duration {:?}: missing unit after {}", input, value),
            other => anyhow::bail!("invalid duration {:?}: unknown unit {:?}", input, other),
        };
        total = total.saturating_add(part);
    }
    Ok(total)
}

fn expand_env(s: &str) -> String {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else if let Some(var_name) = s.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else {
        s.to_string()
    }
}

fn write_template(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Default config template with helpful comments (used for first-time setup)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# D-Drive Configuration
# Auto-created on first run. Edit as needed.

[auth]
# Generate both values with `ddrive hash` and paste them here.
# Environment variables work too: password_hash = "${DDRIVE_PASSWORD_HASH}"
password_hash = ""
salt = ""
iterations = 600000
algorithm = "sha256"            # sha256 | sha512
max_attempts = 5
lockout = "5m"

[session]
inactivity_timeout = "30m"
absolute_timeout = "4h"
check_interval = "60s"

[upload]
max_bytes = 15728640            # 15 MiB
allowed_mime_types = ["image/jpeg", "image/png", "image/gif", "image/webp", "image/bmp"]
allowed_extensions = [".jpg", ".jpeg", ".png", ".gif", ".webp", ".bmp"]

[storage]
# Default: XDG data dir (~/.local/share/ddrive/store)
# dir = "~/ddrive-store"

[logging]
level = "info"
format = "text"                 # or "json"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn template_matches_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), DEFAULT_CONFIG_TEMPLATE);
        let config = Config::load_from(&path, Paths::under(tmp.path())).unwrap();

        assert_eq!(config.auth.iterations, 600_000);
        assert_eq!(config.auth.algorithm, HashAlgorithm::Sha256);
        assert_eq!(config.rate_limit_policy().unwrap(), RateLimitPolicy::default());
        assert_eq!(config.session_policy().unwrap(), SessionPolicy::default());
        assert_eq!(config.upload_policy(), UploadPolicy::default());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.store_dir(), tmp.path().join("data").join("store"));
    }

    #[test]
    fn json_log_format() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "[logging]\nlevel = \"warn\"\nformat = \"json\"\n");
        let config = Config::load_from(&path, Paths::under(tmp.path())).unwrap();
        assert_eq!(config.logging.format, LogFormat::Json);

        let path = write_config(tmp.path(), "[logging]\nformat = \"xml\"\n");
        assert!(Config::load_from(&path, Paths::under(tmp.path())).is_err());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "");
        let config = Config::load_from(&path, Paths::under(tmp.path())).unwrap();

        assert_eq!(config.auth.max_attempts, 5);
        assert_eq!(config.session.absolute_timeout, "4h");
        assert_eq!(config.upload.max_bytes, 15 * 1024 * 1024);
        // No hash configured yet.
        assert!(config.credentials().is_err());
    }

    #[test]
    fn credentials_from_auth_section() {
        let tmp = tempfile::tempdir().unwrap();
        let hash = crate::security::derive_hex(b"pw", b"salt", 10, HashAlgorithm::Sha512).unwrap();
        let path = write_config(
            tmp.path(),
            &format!(
                "[auth]\npassword_hash = \"{hash}\"\nsalt = \"{}\"\niterations = 10\nalgorithm = \"sha512\"\n",
                hex::encode(b"salt")
            ),
        );
        let config = Config::load_from(&path, Paths::under(tmp.path())).unwrap();
        let creds = config.credentials().unwrap();
        assert!(creds.matches("pw").unwrap());
        assert_eq!(creds.algorithm(), HashAlgorithm::Sha512);
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "[auth]\nalgorithm = \"md5\"\n");
        assert!(Config::load_from(&path, Paths::under(tmp.path())).is_err());
    }

    #[test]
    fn custom_policies() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            r#"
[auth]
max_attempts = 3
lockout = "90s"

[session]
inactivity_timeout = "10m"
absolute_timeout = "1h30m"
check_interval = "5s"

[upload]
max_bytes = 1024
allowed_extensions = ["PNG", ".Jpg"]

[storage]
dir = "/var/lib/ddrive"
"#,
        );
        let config = Config::load_from(&path, Paths::under(tmp.path())).unwrap();

        let rl = config.rate_limit_policy().unwrap();
        assert_eq!(rl.max_attempts, 3);
        assert_eq!(rl.lockout, Duration::from_secs(90));

        let session = config.session_policy().unwrap();
        assert_eq!(session.inactivity_timeout, Duration::from_secs(600));
        assert_eq!(session.absolute_timeout, Duration::from_secs(5400));
        assert_eq!(session.check_interval, Duration::from_secs(5));

        let upload = config.upload_policy();
        assert_eq!(upload.max_bytes, 1024);
        assert_eq!(upload.allowed_extensions, vec![".png", ".jpg"]);

        assert_eq!(config.store_dir(), PathBuf::from("/var/lib/ddrive"));
    }

    #[test]
    fn invalid_policies_are_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(
            tmp.path(),
            "[auth]\nmax_attempts = 0\n[session]\ncheck_interval = \"0s\"\n",
        );
        let config = Config::load_from(&path, Paths::under(tmp.path())).unwrap();
        assert!(config.rate_limit_policy().is_err());
        assert!(config.session_policy().is_err());
    }

    #[test]
    fn secrets_expand_env() {
        // SAFETY: test-only env mutation with a unique variable name.
        unsafe { std::env::set_var("DDRIVE_TEST_SALT_7F3A", "abcd") };
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "[auth]\nsalt = \"${DDRIVE_TEST_SALT_7F3A}\"\n");
        let config = Config::load_from(&path, Paths::under(tmp.path())).unwrap();
        assert_eq!(config.auth.salt, "abcd");
    }

    #[test]
    fn unset_env_is_left_verbatim() {
        assert_eq!(
            expand_env("${DDRIVE_TEST_DOES_NOT_EXIST}"),
            "${DDRIVE_TEST_DOES_NOT_EXIST}"
        );
        assert_eq!(expand_env("plain"), "plain");
    }

    #[test]
    fn save_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_config(tmp.path(), "");
        let mut config = Config::load_from(&path, Paths::under(tmp.path())).unwrap();
        config.auth.max_attempts = 9;
        config.save().unwrap();

        let reloaded = Config::load_from(&path, Paths::under(tmp.path())).unwrap();
        assert_eq!(reloaded.auth.max_attempts, 9);
    }

    #[test]
    fn init_refuses_to_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("config.toml");
        Config::init(&path, false).unwrap();
        assert!(Config::init(&path, false).is_err());
        Config::init(&path, true).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG_TEMPLATE);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Config::load(Some(&tmp.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("300").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration(" 4h ").unwrap(), Duration::from_secs(14_400));
        assert_eq!(parse_duration("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5_400));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("5m3").is_err());
        assert!(parse_duration("-5m").is_err());
    }
}
