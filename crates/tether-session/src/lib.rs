//! Durable homeserver sessions that survive restarts.
//!
//! Logging in with a password is expensive and may be rate limited, so a
//! session is persisted after every successful login and reused on the next
//! start if the homeserver still accepts it.
//!
//! # Components
//!
//! - [`store`]: credential record on disk, written atomically (`.tmp` + rename)
//! - [`manager`]: restore, validate, or log in; serialized per process
//! - [`connection`]: connect / disconnect / health for callers

pub mod connection;
pub mod error;
pub mod manager;
pub mod store;

pub use connection::ConnectionManager;
pub use error::{RestoreFailure, Result, SessionError, ValidationFailure};
pub use manager::{
    DEFAULT_DEVICE_NAME, DEFAULT_VALIDATION_TIMEOUT, LoginSource, SessionManager,
    SessionManagerConfig,
};
pub use store::CredentialStore;
