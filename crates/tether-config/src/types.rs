//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [homeserver]        # where and as whom to log in
//! [session]           # where the session file lives
//! [retry]             # attempt budget and backoff schedule
//! [circuit_breaker]   # failure threshold and open timeout
//! [logging]           # log file directory and format
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Device display name used when none is configured.
pub const DEFAULT_DEVICE_NAME: &str = "tether";

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., a project-local
/// file that only sets `[session]`) can be loaded and merged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    pub homeserver: Option<HomeserverConfig>,
    pub session: Option<SessionConfig>,
    pub retry: Option<RetryConfig>,
    pub circuit_breaker: Option<CircuitBreakerConfig>,
    pub logging: Option<LoggingConfig>,
}

impl TetherConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections replace whole; fields are not merged individually.
    pub fn merge(&mut self, other: TetherConfig) {
        if other.homeserver.is_some() {
            self.homeserver = other.homeserver;
        }
        if other.session.is_some() {
            self.session = other.session;
        }
        if other.retry.is_some() {
            self.retry = other.retry;
        }
        if other.circuit_breaker.is_some() {
            self.circuit_breaker = other.circuit_breaker;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// True if `[homeserver]` carries a password in plaintext.
    pub fn has_plaintext_password(&self) -> bool {
        self.homeserver
            .as_ref()
            .is_some_and(HomeserverConfig::has_plaintext_password)
    }

    /// Session file location with `~/` expanded.
    pub fn session_file_path(&self) -> Result<PathBuf> {
        self.session
            .as_ref()
            .and_then(|s| s.session_file_path.as_deref())
            .map(expand_home)
            .ok_or_else(|| ConfigError::missing("session_file_path", "[session]"))
    }

    /// Configured user id, if any.
    pub fn user_id(&self) -> Option<&str> {
        self.homeserver.as_ref().and_then(|h| h.user_id.as_deref())
    }

    /// Log directory with `~/` expanded, if one is configured.
    pub fn log_directory(&self) -> Option<PathBuf> {
        self.logging
            .as_ref()
            .and_then(|l| l.directory.as_deref())
            .map(expand_home)
    }

    /// Whether the log file layer writes JSON lines.
    pub fn log_json(&self) -> bool {
        self.logging.as_ref().map(|l| l.json).unwrap_or(true)
    }

    /// Check required fields and ranges and produce concrete settings.
    ///
    /// The password is not part of the result; it is resolved separately
    /// through [`crate::secrets::resolve_password`] so that commands that
    /// never log in do not need it.
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        let homeserver = self
            .homeserver
            .clone()
            .ok_or_else(|| ConfigError::missing("url", "[homeserver]"))?;
        let homeserver_url = non_empty(homeserver.url, "url", "[homeserver]")?;
        let user_id = non_empty(homeserver.user_id, "user_id", "[homeserver]")?;
        if homeserver.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "request_timeout_secs",
                "must be at least 1",
            ));
        }

        let session = self.session.clone().unwrap_or_default();
        let session_file_path = self.session_file_path()?;

        let retry = self.retry.clone().unwrap_or_default();
        if retry.max_retries == 0 {
            return Err(ConfigError::invalid("max_retries", "must be at least 1"));
        }

        let breaker = self.circuit_breaker.clone().unwrap_or_default();
        if breaker.failure_threshold == 0 {
            return Err(ConfigError::invalid(
                "failure_threshold",
                "must be at least 1",
            ));
        }

        Ok(ResolvedConfig {
            homeserver_url,
            user_id,
            device_name: homeserver.device_name,
            request_timeout: Duration::from_secs(homeserver.request_timeout_secs),
            session_file_path,
            validation_timeout: (session.validation_timeout_secs > 0)
                .then(|| Duration::from_secs(session.validation_timeout_secs)),
            max_retries: retry.max_retries,
            retry_backoff: retry
                .retry_backoff_seconds
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
            call_timeout: (retry.call_timeout_secs > 0)
                .then(|| Duration::from_secs(retry.call_timeout_secs)),
            failure_threshold: breaker.failure_threshold,
            circuit_open_timeout: Duration::from_secs(breaker.circuit_open_timeout_seconds),
        })
    }
}

fn non_empty(value: Option<String>, field: &str, context: &str) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::missing(field, context)),
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    path.to_path_buf()
}

// ─────────────────────────────────────────────────────────────────────────────
// Sections
// ─────────────────────────────────────────────────────────────────────────────

/// `[homeserver]`
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HomeserverConfig {
    /// Base URL, e.g. `https://matrix.example.org`.
    pub url: Option<String>,
    /// Fully qualified user id, e.g. `@bot:example.org`.
    pub user_id: Option<String>,
    /// Plaintext password (not recommended; prefer keyring or env var).
    pub password: Option<String>,
    /// Display name for devices created by fresh logins.
    pub device_name: String,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HomeserverConfig {
    fn default() -> Self {
        Self {
            url: None,
            user_id: None,
            password: None,
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl HomeserverConfig {
    pub fn has_plaintext_password(&self) -> bool {
        self.password.as_deref().is_some_and(|p| !p.is_empty())
    }
}

impl std::fmt::Debug for HomeserverConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HomeserverConfig")
            .field("url", &self.url)
            .field("user_id", &self.user_id)
            .field("password", &self.password.as_ref().map(|_| "[redacted]"))
            .field("device_name", &self.device_name)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// `[session]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Where the session file is kept. Required.
    pub session_file_path: Option<PathBuf>,
    /// Bound on the whoami call that validates a restored session.
    pub validation_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_file_path: None,
            validation_timeout_secs: 30,
        }
    }
}

/// `[retry]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per call, including the first.
    pub max_retries: u32,
    /// Delay after each failed attempt; the last entry repeats.
    pub retry_backoff_seconds: Vec<u64>,
    /// Per-attempt timeout in seconds. Zero disables it.
    pub call_timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_seconds: vec![2, 4, 8],
            call_timeout_secs: 60,
        }
    }
}

/// `[circuit_breaker]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub circuit_open_timeout_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            circuit_open_timeout_seconds: 300,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the daily log file. Defaults to `<config dir>/logs`.
    pub directory: Option<PathBuf>,
    /// Write the log file as JSON lines.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            json: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolved settings
// ─────────────────────────────────────────────────────────────────────────────

/// Concrete, validated settings ready to build the session stack from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub homeserver_url: String,
    pub user_id: String,
    pub device_name: String,
    pub request_timeout: Duration,
    pub session_file_path: PathBuf,
    /// `None` when `validation_timeout_secs = 0`.
    pub validation_timeout: Option<Duration>,
    pub max_retries: u32,
    pub retry_backoff: Vec<Duration>,
    pub call_timeout: Option<Duration>,
    pub failure_threshold: u32,
    pub circuit_open_timeout: Duration,
}
