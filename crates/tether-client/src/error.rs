//! Client error types.

use thiserror::Error;

/// Error codes the homeserver uses to say the access token is no good.
pub const INVALID_TOKEN_CODES: &[&str] = &["M_UNKNOWN_TOKEN", "M_MISSING_TOKEN"];

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Homeserver returned an error response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Machine-readable error code (`errcode`), if the server sent one.
        errcode: Option<String>,
        /// Human-readable error message.
        message: String,
    },

    /// The homeserver refused the login attempt.
    #[error("Login rejected: {0}")]
    LoginRejected(String),

    /// No access token is loaded.
    #[error("Not logged in")]
    NotLoggedIn,

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this error means the access token is invalid or expired.
    pub fn is_auth_error(&self) -> bool {
        match self {
            Error::Api {
                status, errcode, ..
            } => {
                *status == 401
                    || errcode
                        .as_deref()
                        .is_some_and(|code| INVALID_TOKEN_CODES.contains(&code))
            }
            Error::NotLoggedIn => true,
            _ => false,
        }
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::Api { status: 429, .. })
            || self.errcode() == Some("M_LIMIT_EXCEEDED")
    }

    /// Check if this is a server error.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Error::Api { status, .. } if *status >= 500)
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Machine-readable error code attached to the error, if any.
    pub fn errcode(&self) -> Option<&str> {
        match self {
            Error::Api { errcode, .. } => errcode.as_deref(),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error body returned by the homeserver.
#[derive(Debug, serde::Deserialize)]
pub(crate) struct ErrorResponse {
    pub errcode: Option<String>,
    #[serde(default)]
    pub error: String,
}
