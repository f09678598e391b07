//! Auth-aware retry and circuit breaking for homeserver calls.
//!
//! # Components
//!
//! - [`circuit_breaker`]: closed / open / half-open guard, evaluated lazily
//! - [`retry`]: attempt budget and backoff schedule
//! - [`handler`]: [`ErrorHandler::call_with_retry`], which re-authenticates
//!   on expired tokens and reports every outcome to the breaker
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tether_resilience::{CircuitBreaker, ErrorHandler, RetryPolicy};
//!
//! let breaker = Arc::new(CircuitBreaker::default());
//! let handler = ErrorHandler::new(session_manager, breaker, RetryPolicy::default());
//!
//! let history = handler
//!     .call(&tether_client::ApiRequest::room_messages("!room:example.org", 20))
//!     .await?;
//! ```

pub mod circuit_breaker;
pub mod error;
pub mod handler;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState,
    DEFAULT_FAILURE_THRESHOLD, DEFAULT_OPEN_TIMEOUT,
};
pub use error::{CallOutcome, ResilienceError, Result};
pub use handler::ErrorHandler;
pub use retry::{DEFAULT_BACKOFF_SECS, DEFAULT_MAX_RETRIES, RetryPolicy};
