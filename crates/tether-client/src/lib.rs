//! Homeserver client for the tether session layer.
//!
//! The session and resilience crates only care about three outcomes of a
//! remote call: it authenticated, the token was rejected, or it failed for
//! some other reason. This crate provides:
//!
//! - [`RemoteAuthClient`]: the capability trait (login, whoami, generic call,
//!   credential accessors)
//! - [`MatrixClient`]: an implementation over the Matrix client-server API
//! - [`Error::is_auth_error`]: the auth / non-auth classification
//! - `testing::ScriptedClient` (feature `testing`): a queued-outcome client
//!
//! # Example
//!
//! ```no_run
//! use tether_client::{ApiRequest, MatrixClient, RemoteAuthClient, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = MatrixClient::builder()
//!     .homeserver_url("https://matrix.example.org")
//!     .user_id("@bot:example.org")
//!     .build()?;
//!
//! client.login("hunter2", "tether").await?;
//! let me = client.whoami().await?;
//! println!("token belongs to {}", me.user_id);
//!
//! let history = client.call(&ApiRequest::room_messages("!abc:example.org", 10)).await?;
//! println!("{}", history);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{ClientBuilder, MatrixClient, RemoteAuthClient};
pub use error::{Error, INVALID_TOKEN_CODES, Result};
pub use types::{ApiRequest, IdentityInfo, Session, mask_token};
