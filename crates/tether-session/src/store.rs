//! Durable credential record.
//!
//! One JSON file per identity holding `access_token`, `device_id` and
//! `user_id`. Writes go to `<path>.tmp` first and are renamed into place, so
//! a reader sees either the previous record or the new one, never a torn
//! write. The `.tmp` sibling is never read.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tether_client::Session;

use crate::error::{RestoreFailure, Result, SessionError};

/// Suffix appended to the record path while a write is in progress.
pub const TEMP_SUFFIX: &str = ".tmp";

/// On-disk layout, lenient so that missing fields are reported as
/// incomplete rather than malformed.
#[derive(Debug, Deserialize)]
struct CredentialRecord {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    device_id: String,
    #[serde(default)]
    access_token: String,
}

/// File-backed store for a single session.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a store for the record at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the record path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the transient write-in-progress file.
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(TEMP_SUFFIX);
        PathBuf::from(name)
    }

    /// Check if a record file exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Load the record, checking it belongs to `expected_user_id`.
    ///
    /// The identity check is case-sensitive and skipped when
    /// `expected_user_id` is empty.
    pub fn load(&self, expected_user_id: &str) -> std::result::Result<Session, RestoreFailure> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(RestoreFailure::Missing),
            Err(e) => return Err(RestoreFailure::Unreadable(e)),
        };

        let record: CredentialRecord =
            serde_json::from_str(&content).map_err(RestoreFailure::Malformed)?;
        let session = Session::new(record.user_id, record.device_id, record.access_token);
        if !session.is_complete() {
            return Err(RestoreFailure::Incomplete);
        }

        if !expected_user_id.is_empty() && session.user_id != expected_user_id {
            return Err(RestoreFailure::UserMismatch {
                expected: expected_user_id.to_string(),
                found: session.user_id,
            });
        }

        Ok(session)
    }

    /// Atomically replace the record with `session`.
    ///
    /// On failure the temp file is removed and the previous record, if any,
    /// is left untouched.
    pub fn save(&self, session: &Session) -> Result<()> {
        if !session.is_complete() {
            return Err(SessionError::IncompleteSession);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SessionError::persistence(parent, e))?;
        }

        let json = serde_json::to_vec_pretty(session)?;
        let temp_path = self.temp_path();

        if let Err(e) = write_private(&temp_path, &json) {
            let _ = fs::remove_file(&temp_path);
            return Err(SessionError::persistence(&temp_path, e));
        }

        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(SessionError::persistence(&self.path, e));
        }

        sync_parent_dir(&self.path);
        tracing::info!(path = %self.path.display(), "Session saved");
        Ok(())
    }
}

/// Write `bytes` to `path` readable and writable by the owner only.
fn write_private(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;

    // `mode` only applies on creation; a leftover temp file keeps its bits.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.write_all(bytes)?;
    file.sync_all()
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return;
    };
    if let Err(e) = fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        tracing::debug!(dir = %parent.display(), error = %e, "Could not fsync credential directory");
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
