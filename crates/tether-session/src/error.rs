//! Error types for session management.

use std::path::PathBuf;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors surfaced by the session manager and credential store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Fresh login failed; there is no usable session.
    #[error("Authentication failed: {0}")]
    Authentication(#[source] tether_client::Error),

    /// Refused to persist a session with an empty field.
    #[error("Refusing to persist an incomplete session")]
    IncompleteSession,

    /// Reading or writing the credential file failed.
    #[error("Credential file error at '{path}': {source}")]
    Persistence {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The blocking save task did not complete.
    #[error("Credential save task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SessionError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SessionError::Persistence {
            path: path.into(),
            source,
        }
    }

    /// True when the remote service rejected the credentials.
    pub fn is_authentication(&self) -> bool {
        matches!(self, SessionError::Authentication(_))
    }
}

/// Why a saved session could not be restored.
///
/// Never surfaced to callers of `login()`: every variant falls through to a
/// fresh login. Exposed so status tooling can explain what it found.
#[derive(Debug, thiserror::Error)]
pub enum RestoreFailure {
    #[error("no credential file")]
    Missing,

    #[error("credential file unreadable: {0}")]
    Unreadable(#[source] std::io::Error),

    #[error("credential file malformed: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("credential file is missing user_id, device_id or access_token")]
    Incomplete,

    #[error("credential file belongs to {found}, expected {expected}")]
    UserMismatch { expected: String, found: String },
}

/// Why a restored session was judged invalid by the remote service.
///
/// Like [`RestoreFailure`], handled internally by falling back to a fresh
/// login.
#[derive(Debug, thiserror::Error)]
pub enum ValidationFailure {
    #[error("identity check rejected the token: {0}")]
    Rejected(#[source] tether_client::Error),

    #[error("identity check timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("token belongs to {found}, expected {expected}")]
    IdentityMismatch { expected: String, found: String },
}
