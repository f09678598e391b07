//! Connection lifecycle for one authenticated session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tether_client::Session;

use crate::error::Result;
use crate::manager::SessionManager;

/// Single entry and exit point for a session's lifecycle.
///
/// `connect` has no internal timeout and does not retry; bound the startup
/// sequence at the call site.
#[derive(Debug)]
pub struct ConnectionManager {
    session_manager: Arc<SessionManager>,
    connected: AtomicBool,
}

impl ConnectionManager {
    pub fn new(session_manager: Arc<SessionManager>) -> Self {
        Self {
            session_manager,
            connected: AtomicBool::new(false),
        }
    }

    /// Authenticate, restoring the saved session when possible.
    pub async fn connect(&self) -> Result<Session> {
        let session = self.session_manager.login().await?;
        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(
            user_id = %session.user_id,
            source = ?self.session_manager.login_source(),
            "Connected"
        );
        Ok(session)
    }

    /// Close the transport and drop the in-memory session.
    ///
    /// The credential file stays on disk so the next `connect` can restore
    /// it. Safe to call when never connected.
    pub async fn disconnect(&self) {
        self.session_manager.client().close().await;
        self.session_manager.invalidate();
        if self.connected.swap(false, Ordering::SeqCst) {
            tracing::info!(user_id = %self.session_manager.user_id(), "Disconnected");
        }
    }

    /// Local, non-network check that a usable session is loaded.
    pub fn health_check(&self) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        let client = self.session_manager.client();
        let has_token = client.access_token().is_some_and(|t| !t.is_empty());
        let has_device = client.device_id().is_some_and(|d| !d.is_empty());
        has_token && has_device
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn session_manager(&self) -> &Arc<SessionManager> {
        &self.session_manager
    }
}
