//! Secrets management: homeserver password storage and retrieval.
//!
//! Resolution order:
//! 1. System keyring (if `keyring` feature enabled)
//! 2. `TETHER_PASSWORD` environment variable
//! 3. Config file (with warning)
//!
//! Keyring entries are stored as service="tether", user=<matrix user id>.

use crate::{ConfigError, Result};

/// Keyring service name.
const SERVICE_NAME: &str = "tether";

/// Environment variable holding the homeserver password.
pub const PASSWORD_ENV_VAR: &str = "TETHER_PASSWORD";

/// Result of password resolution with provenance.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("value", &"[redacted]")
            .field("source", &self.source)
            .finish()
    }
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// OS keyring (macOS Keychain, Linux secret-service, Windows Credential Manager).
    Keyring,
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::Keyring => write!(f, "system keyring"),
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Find the password for `user_id`, or `None` if no source has one.
pub fn lookup_password(user_id: &str, config_value: Option<&str>) -> Option<ResolvedSecret> {
    lookup_password_with(user_id, config_value, |var| std::env::var(var).ok())
}

/// Like [`lookup_password`], but an absent password is an error.
pub fn resolve_password(user_id: &str, config_value: Option<&str>) -> Result<ResolvedSecret> {
    lookup_password(user_id, config_value).ok_or_else(|| ConfigError::PasswordNotFound {
        env_var: PASSWORD_ENV_VAR.to_string(),
    })
}

fn lookup_password_with(
    user_id: &str,
    config_value: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Option<ResolvedSecret> {
    // 1. Keyring
    if let Some(secret) = get_from_keyring(user_id) {
        return Some(secret);
    }

    // 2. Environment variable
    if let Some(value) = env(PASSWORD_ENV_VAR)
        && !value.is_empty()
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(PASSWORD_ENV_VAR.to_string()),
        });
    }

    // 3. Config file
    config_value
        .filter(|v| !v.is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
}

/// Store a password in the system keyring.
///
/// Returns an error message if keyring is not available.
pub fn store_in_keyring(user_id: &str, password: &str) -> std::result::Result<(), String> {
    store_keyring_entry(SERVICE_NAME, user_id, password)
}

/// Delete a password from the system keyring.
pub fn delete_from_keyring(user_id: &str) -> std::result::Result<(), String> {
    delete_keyring_entry(SERVICE_NAME, user_id)
}

/// Check if a keyring entry exists for a user.
pub fn has_keyring_entry(user_id: &str) -> bool {
    get_from_keyring(user_id).is_some()
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyring implementation (feature-gated)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "keyring")]
fn get_from_keyring(user_id: &str) -> Option<ResolvedSecret> {
    // Keep tests isolated from the local machine's keychain.
    if cfg!(test) {
        return None;
    }

    let entry = keyring::Entry::new(SERVICE_NAME, user_id).ok()?;
    let value = entry.get_password().ok()?;
    if value.is_empty() {
        return None;
    }
    Some(ResolvedSecret {
        value,
        source: SecretSource::Keyring,
    })
}

#[cfg(feature = "keyring")]
fn store_keyring_entry(service: &str, user: &str, secret: &str) -> std::result::Result<(), String> {
    if cfg!(test) {
        return Err("keyring access disabled in tests".to_string());
    }
    let entry = keyring::Entry::new(service, user).map_err(|e| format!("keyring error: {}", e))?;
    entry
        .set_password(secret)
        .map_err(|e| format!("failed to store in keyring: {}", e))
}

#[cfg(feature = "keyring")]
fn delete_keyring_entry(service: &str, user: &str) -> std::result::Result<(), String> {
    if cfg!(test) {
        return Err("keyring access disabled in tests".to_string());
    }
    let entry = keyring::Entry::new(service, user).map_err(|e| format!("keyring error: {}", e))?;
    entry
        .delete_credential()
        .map_err(|e| format!("failed to delete from keyring: {}", e))
}

// ─────────────────────────────────────────────────────────────────────────────
// No-op stubs when keyring feature is disabled
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(not(feature = "keyring"))]
fn get_from_keyring(_user_id: &str) -> Option<ResolvedSecret> {
    None
}

#[cfg(not(feature = "keyring"))]
fn store_keyring_entry(
    _service: &str,
    _user: &str,
    _secret: &str,
) -> std::result::Result<(), String> {
    Err("keyring support not compiled in (enable the 'keyring' feature)".to_string())
}

#[cfg(not(feature = "keyring"))]
fn delete_keyring_entry(_service: &str, _user: &str) -> std::result::Result<(), String> {
    Err("keyring support not compiled in (enable the 'keyring' feature)".to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
