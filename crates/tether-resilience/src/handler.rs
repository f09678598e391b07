//! Auth-aware retry around remote calls.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tether_client::ApiRequest;
use tether_session::SessionManager;

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{CallOutcome, ResilienceError, Result};
use crate::retry::RetryPolicy;

/// Failure of a single attempt.
enum AttemptError {
    Client(tether_client::Error),
    Timeout(Duration),
}

impl From<AttemptError> for ResilienceError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::Client(e) => ResilienceError::Transient(e),
            AttemptError::Timeout(limit) => ResilienceError::Timeout(limit),
        }
    }
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Client(e) => write!(f, "{}", e),
            AttemptError::Timeout(limit) => write!(f, "timed out after {:?}", limit),
        }
    }
}

/// Wraps remote calls so callers never special-case token expiry.
///
/// On an auth error the session manager logs in again and the call is
/// retried; other failures are retried after the scheduled backoff. Every
/// outcome is reported to the shared circuit breaker, which refuses calls
/// outright while open.
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    session_manager: Arc<SessionManager>,
    circuit_breaker: Arc<CircuitBreaker>,
    policy: RetryPolicy,
}

impl ErrorHandler {
    pub fn new(
        session_manager: Arc<SessionManager>,
        circuit_breaker: Arc<CircuitBreaker>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            session_manager,
            circuit_breaker,
            policy,
        }
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Issue a generic call through the session manager's client.
    pub async fn call(&self, request: &ApiRequest) -> Result<serde_json::Value> {
        let client = self.session_manager.client();
        self.call_with_retry(move || client.call(request)).await
    }

    /// Run `operation` until it succeeds or the retry budget is spent.
    ///
    /// Attempts for one invocation are strictly sequential.
    pub async fn call_with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = tether_client::Result<T>>,
    {
        if !self.circuit_breaker.should_allow_request() {
            tracing::warn!(
                outcome = CallOutcome::CircuitOpen.as_str(),
                "Circuit breaker open, refusing call"
            );
            return Err(ResilienceError::CircuitOpen);
        }

        let attempts = self.policy.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            let final_attempt = attempt >= attempts;

            let result = match self.policy.call_timeout {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(result) => result.map_err(AttemptError::Client),
                    Err(_) => Err(AttemptError::Timeout(limit)),
                },
                None => operation().await.map_err(AttemptError::Client),
            };

            match result {
                Ok(value) => {
                    self.circuit_breaker.record_success();
                    tracing::debug!(
                        outcome = CallOutcome::Success.as_str(),
                        attempt,
                        "Call succeeded"
                    );
                    return Ok(value);
                }

                Err(AttemptError::Client(e)) if e.is_auth_error() => {
                    if final_attempt {
                        self.circuit_breaker.record_failure();
                        tracing::error!(
                            outcome = CallOutcome::AuthExhausted.as_str(),
                            attempts,
                            error = %e,
                            "Max retries exceeded for authentication error"
                        );
                        return Err(ResilienceError::AuthRetriesExhausted { attempts, last: e });
                    }

                    tracing::warn!(
                        attempt,
                        max_retries = attempts,
                        error = %e,
                        "Authentication error, re-authenticating"
                    );
                    if let Err(login_err) = self.session_manager.login().await {
                        self.circuit_breaker.record_failure();
                        tracing::error!(
                            outcome = CallOutcome::ReauthFailed.as_str(),
                            error = %login_err,
                            "Re-authentication failed"
                        );
                        return Err(ResilienceError::Reauthentication(login_err));
                    }
                    self.circuit_breaker.record_success();
                    self.backoff(attempt).await;
                }

                Err(failure) => {
                    if final_attempt {
                        tracing::error!(
                            outcome = CallOutcome::TransientExhausted.as_str(),
                            attempts,
                            error = %failure,
                            "Call failed, retries exhausted"
                        );
                        return Err(failure.into());
                    }

                    tracing::warn!(
                        attempt,
                        max_retries = attempts,
                        error = %failure,
                        "Call failed, retrying"
                    );
                    self.backoff(attempt).await;
                }
            }
        }
    }

    async fn backoff(&self, attempt: u32) {
        let delay = self.policy.delay_for(attempt);
        if !delay.is_zero() {
            tracing::debug!(backoff_ms = delay.as_millis() as u64, "Backing off");
            tokio::time::sleep(delay).await;
        }
    }
}
