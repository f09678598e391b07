//! Error types for resilient calls.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Terminal outcome of a `call_with_retry`, for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    /// Auth errors on every attempt.
    AuthExhausted,
    /// Re-authentication itself failed.
    ReauthFailed,
    /// Non-auth failure on the final attempt.
    TransientExhausted,
    /// Refused without calling the operation.
    CircuitOpen,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::AuthExhausted => "auth_exhausted",
            CallOutcome::ReauthFailed => "reauth_failed",
            CallOutcome::TransientExhausted => "transient_exhausted",
            CallOutcome::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a resilient call gave up.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// The circuit breaker refused the call; the operation never ran.
    #[error("circuit breaker is open, request not attempted")]
    CircuitOpen,

    /// Logging in again after an auth error failed.
    #[error("re-authentication failed: {0}")]
    Reauthentication(#[source] tether_session::SessionError),

    /// Every attempt hit an auth error.
    #[error("max retries exceeded for authentication error ({attempts} attempts)")]
    AuthRetriesExhausted {
        attempts: u32,
        #[source]
        last: tether_client::Error,
    },

    /// A non-auth failure on the final attempt, passed through unchanged.
    #[error(transparent)]
    Transient(tether_client::Error),

    /// The final attempt exceeded the per-call timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

impl ResilienceError {
    pub fn outcome(&self) -> CallOutcome {
        match self {
            ResilienceError::CircuitOpen => CallOutcome::CircuitOpen,
            ResilienceError::Reauthentication(_) => CallOutcome::ReauthFailed,
            ResilienceError::AuthRetriesExhausted { .. } => CallOutcome::AuthExhausted,
            ResilienceError::Transient(_) | ResilienceError::Timeout(_) => {
                CallOutcome::TransientExhausted
            }
        }
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ResilienceError::CircuitOpen)
    }

    /// True when the session could not be (re)authenticated.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            ResilienceError::Reauthentication(_) | ResilienceError::AuthRetriesExhausted { .. }
        )
    }

    /// True for network, server, and timeout failures.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ResilienceError::Transient(_) | ResilienceError::Timeout(_)
        )
    }
}
