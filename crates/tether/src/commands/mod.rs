//! CLI command handlers.

pub mod config;
pub mod connect;
pub mod messages;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use tether_client::MatrixClient;
use tether_config::LoadedConfig;
use tether_resilience::{CircuitBreaker, CircuitBreakerConfig, ErrorHandler, RetryPolicy};
use tether_session::{ConnectionManager, CredentialStore, SessionManager, SessionManagerConfig};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Explicit config file (`--config` / `TETHER_CONFIG`), bypassing discovery.
    pub config_path: Option<PathBuf>,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load the explicit config file, or discover and merge the usual layers.
    pub fn load_config(&self) -> Result<LoadedConfig> {
        let loaded = match &self.config_path {
            Some(path) => tether_config::load_config_from(path)?,
            None => tether_config::load_config(None)?,
        };
        Ok(loaded)
    }
}

/// Everything a networked command needs, wired from one resolved config.
pub struct Stack {
    pub connection: ConnectionManager,
    pub handler: ErrorHandler,
    pub breaker: Arc<CircuitBreaker>,
}

impl Stack {
    /// Build client, store, managers, breaker and handler.
    ///
    /// Nothing touches the network until [`ConnectionManager::connect`].
    pub fn build(ctx: &Context) -> Result<Self> {
        let loaded = ctx.load_config()?;
        let resolved = loaded.config.resolve()?;
        let password = tether_config::resolve_password(
            &resolved.user_id,
            loaded
                .config
                .homeserver
                .as_ref()
                .and_then(|h| h.password.as_deref()),
        )?;
        tracing::debug!(source = %password.source, "Resolved homeserver password");

        let client = MatrixClient::builder()
            .homeserver_url(&resolved.homeserver_url)
            .user_id(&resolved.user_id)
            .timeout(resolved.request_timeout)
            .user_agent(concat!("tether/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build homeserver client")?;

        let session_config = SessionManagerConfig::new(&resolved.user_id, password.value)
            .with_device_name(&resolved.device_name)
            .with_validation_timeout(resolved.validation_timeout);
        let session_manager = Arc::new(SessionManager::new(
            Arc::new(client),
            CredentialStore::new(&resolved.session_file_path),
            session_config,
        ));

        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::new(
            resolved.failure_threshold,
            resolved.circuit_open_timeout,
        )));
        let policy = RetryPolicy::new(resolved.max_retries, resolved.retry_backoff.clone())
            .with_call_timeout(resolved.call_timeout);
        let handler = ErrorHandler::new(session_manager.clone(), breaker.clone(), policy);

        Ok(Self {
            connection: ConnectionManager::new(session_manager),
            handler,
            breaker,
        })
    }

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        self.connection.session_manager()
    }
}
