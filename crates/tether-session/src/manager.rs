//! Session manager: restore, validate, or log in, then persist.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tether_client::{RemoteAuthClient, Session};
use tokio::sync::Mutex;

use crate::error::{RestoreFailure, Result, SessionError, ValidationFailure};
use crate::store::CredentialStore;

/// Device display name sent with a fresh login.
pub const DEFAULT_DEVICE_NAME: &str = "tether";

/// Default bound on the identity check of a restored session.
pub const DEFAULT_VALIDATION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// SessionManagerConfig
// ============================================================================

/// Identity and credentials the manager logs in with.
#[derive(Clone)]
pub struct SessionManagerConfig {
    /// The identity this manager acts for. Saved records for any other user
    /// are ignored.
    pub user_id: String,
    pub password: String,
    pub device_name: String,
    /// Bound on the whoami call; `None` waits indefinitely. A zero bound is
    /// stored as `None`.
    pub validation_timeout: Option<Duration>,
}

impl SessionManagerConfig {
    pub fn new(user_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            password: password.into(),
            device_name: DEFAULT_DEVICE_NAME.to_string(),
            validation_timeout: Some(DEFAULT_VALIDATION_TIMEOUT),
        }
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    pub fn with_validation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.validation_timeout = timeout.filter(|t| !t.is_zero());
        self
    }
}

impl fmt::Debug for SessionManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManagerConfig")
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .field("device_name", &self.device_name)
            .field("validation_timeout", &self.validation_timeout)
            .finish()
    }
}

/// How the current session was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginSource {
    /// Loaded from the credential file and accepted by the homeserver.
    Restored,
    /// Issued by a password login.
    FreshLogin,
}

impl fmt::Display for LoginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoginSource::Restored => write!(f, "restored"),
            LoginSource::FreshLogin => write!(f, "fresh login"),
        }
    }
}

// ============================================================================
// SessionManager
// ============================================================================

/// Obtains a valid session while avoiding redundant password logins.
///
/// `login()` tries the saved credential record first and only falls back to
/// a password login when the record is absent, unusable, or rejected by the
/// homeserver. Restore and validation problems are logged, never returned.
pub struct SessionManager {
    client: Arc<dyn RemoteAuthClient>,
    store: CredentialStore,
    config: SessionManagerConfig,
    /// Serializes the read-validate-write sequence within the process.
    login_lock: Mutex<()>,
    current: RwLock<Option<(Session, LoginSource)>>,
}

impl SessionManager {
    pub fn new(
        client: Arc<dyn RemoteAuthClient>,
        store: CredentialStore,
        config: SessionManagerConfig,
    ) -> Self {
        Self {
            client,
            store,
            config,
            login_lock: Mutex::new(()),
            current: RwLock::new(None),
        }
    }

    /// Produce an authenticated session.
    ///
    /// Returns [`SessionError::Authentication`] only when the password login
    /// itself fails.
    pub async fn login(&self) -> Result<Session> {
        let _guard = self.login_lock.lock().await;

        if let Some(session) = self.try_restore().await {
            *self.current.write() = Some((session.clone(), LoginSource::Restored));
            return Ok(session);
        }

        let session = self.fresh_login().await?;
        *self.current.write() = Some((session.clone(), LoginSource::FreshLogin));
        Ok(session)
    }

    async fn try_restore(&self) -> Option<Session> {
        let session = match self.store.load(&self.config.user_id) {
            Ok(session) => session,
            Err(RestoreFailure::Missing) => {
                tracing::debug!(path = %self.store.path().display(), "No saved session");
                return None;
            }
            Err(reason) => {
                tracing::warn!(
                    path = %self.store.path().display(),
                    reason = %reason,
                    "Saved session not restorable, logging in"
                );
                return None;
            }
        };

        self.client.restore_session(&session);
        match self.validate(&session).await {
            Ok(()) => {
                tracing::info!(
                    user_id = %session.user_id,
                    device_id = %session.device_id,
                    "Restored saved session"
                );
                Some(session)
            }
            Err(reason) => {
                tracing::warn!(
                    user_id = %session.user_id,
                    reason = %reason,
                    "Saved session rejected, logging in"
                );
                self.client.clear_credentials();
                None
            }
        }
    }

    async fn validate(&self, session: &Session) -> std::result::Result<(), ValidationFailure> {
        let check = self.client.whoami();
        let outcome = match self.config.validation_timeout {
            Some(limit) => tokio::time::timeout(limit, check)
                .await
                .map_err(|_| ValidationFailure::TimedOut(limit))?,
            None => check.await,
        };

        let info = outcome.map_err(ValidationFailure::Rejected)?;
        if info.user_id != session.user_id {
            return Err(ValidationFailure::IdentityMismatch {
                expected: session.user_id.clone(),
                found: info.user_id,
            });
        }
        Ok(())
    }

    async fn fresh_login(&self) -> Result<Session> {
        let session = self
            .client
            .login(&self.config.password, &self.config.device_name)
            .await
            .map_err(|e| {
                tracing::error!(user_id = %self.config.user_id, error = %e, "Login failed");
                SessionError::Authentication(e)
            })?;

        if !session.is_complete() {
            self.client.clear_credentials();
            return Err(SessionError::Authentication(
                tether_client::Error::LoginRejected(
                    "homeserver issued an incomplete session".to_string(),
                ),
            ));
        }

        self.persist(&session).await?;
        tracing::info!(
            user_id = %session.user_id,
            device_id = %session.device_id,
            "Logged in"
        );
        Ok(session)
    }

    /// Save on a blocking task. Once spawned the write runs to completion
    /// even if this future is dropped.
    async fn persist(&self, session: &Session) -> Result<()> {
        let store = self.store.clone();
        let session = session.clone();
        tokio::task::spawn_blocking(move || store.save(&session)).await?
    }

    /// The session currently held in memory.
    pub fn session(&self) -> Option<Session> {
        self.current.read().as_ref().map(|(s, _)| s.clone())
    }

    /// How the in-memory session was obtained.
    pub fn login_source(&self) -> Option<LoginSource> {
        self.current.read().as_ref().map(|(_, source)| *source)
    }

    /// Drop the in-memory session. The credential file is kept.
    pub fn invalidate(&self) {
        *self.current.write() = None;
        self.client.clear_credentials();
    }

    /// The identity this manager acts for.
    pub fn user_id(&self) -> &str {
        &self.config.user_id
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn client(&self) -> &Arc<dyn RemoteAuthClient> {
        &self.client
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("store", &self.store)
            .field("config", &self.config)
            .field("session", &self.session())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tether_client::IdentityInfo;
    use tether_client::testing::{ScriptedClient, unknown_token_error};

    const USER: &str = "@bot:example.org";

    fn manager(client: Arc<ScriptedClient>, store: CredentialStore) -> SessionManager {
        SessionManager::new(client, store, SessionManagerConfig::new(USER, "hunter2"))
    }

    #[tokio::test]
    async fn test_fresh_login_when_no_file() {
        let temp = tempdir().unwrap();
        let store = CredentialStore::new(temp.path().join("session.json"));
        let client = Arc::new(ScriptedClient::new(USER));
        client.push_login_ok("DEV1", "tok1");

        let manager = manager(client.clone(), store.clone());
        let session = manager.login().await.unwrap();

        assert_eq!(session, Session::new(USER, "DEV1", "tok1"));
        assert_eq!(manager.login_source(), Some(LoginSource::FreshLogin));
        assert_eq!(client.login_count(), 1);
        assert_eq!(client.whoami_count(), 0);
        assert_eq!(store.load(USER).unwrap(), session);
    }

    #[tokio::test]
    async fn test_restore_round_trip_without_login() {
        let temp = tempdir().unwrap();
        let store = CredentialStore::new(temp.path().join("session.json"));
        let saved = Session::new(USER, "DEV1", "tok1");
        store.save(&saved).unwrap();

        let client = Arc::new(ScriptedClient::new(USER));
        let manager = manager(client.clone(), store);
        let session = manager.login().await.unwrap();

        assert_eq!(session, saved);
        assert_eq!(manager.login_source(), Some(LoginSource::Restored));
        assert_eq!(client.login_count(), 0);
        assert_eq!(client.whoami_count(), 1);
        assert_eq!(client.access_token().as_deref(), Some("tok1"));
    }

    #[tokio::test]
    async fn test_rejected_token_falls_back_to_login() {
        let temp = tempdir().unwrap();
        let store = CredentialStore::new(temp.path().join("session.json"));
        store.save(&Session::new(USER, "OLD", "stale")).unwrap();

        let client = Arc::new(ScriptedClient::new(USER));
        client.push_whoami(Err(unknown_token_error()));
        client.push_login_ok("NEW", "fresh");

        let manager = manager(client.clone(), store.clone());
        let session = manager.login().await.unwrap();

        assert_eq!(session, Session::new(USER, "NEW", "fresh"));
        assert_eq!(client.login_count(), 1);
        assert_eq!(store.load(USER).unwrap(), session);
    }

    #[tokio::test]
    async fn test_user_mismatch_is_never_adopted() {
        let temp = tempdir().unwrap();
        let store = CredentialStore::new(temp.path().join("session.json"));
        store
            .save(&Session::new("@old:example.org", "DEV0", "other"))
            .unwrap();

        let client = Arc::new(ScriptedClient::new(USER));
        client.push_login_ok("DEV1", "tok1");

        let manager = manager(client.clone(), store.clone());
        let session = manager.login().await.unwrap();

        assert_eq!(session.user_id, USER);
        assert_eq!(client.whoami_count(), 0);
        assert_eq!(client.login_count(), 1);
        assert_eq!(store.load(USER).unwrap(), session);
    }

    #[tokio::test]
    async fn test_whoami_for_another_user_is_invalid() {
        let temp = tempdir().unwrap();
        let store = CredentialStore::new(temp.path().join("session.json"));
        store.save(&Session::new(USER, "DEV1", "tok1")).unwrap();

        let client = Arc::new(ScriptedClient::new(USER));
        client.push_whoami(Ok(IdentityInfo {
            user_id: "@intruder:example.org".to_string(),
            device_id: None,
            is_guest: false,
        }));
        client.push_login_ok("DEV2", "tok2");

        let manager = manager(client.clone(), store);
        let session = manager.login().await.unwrap();
        assert_eq!(session.device_id, "DEV2");
        assert_eq!(client.login_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_file_falls_back_to_login() {
        let temp = tempdir().unwrap();
        let store = CredentialStore::new(temp.path().join("session.json"));
        std::fs::write(store.path(), "{ truncated").unwrap();

        let client = Arc::new(ScriptedClient::new(USER));
        client.push_login_ok("DEV1", "tok1");

        let manager = manager(client.clone(), store.clone());
        manager.login().await.unwrap();
        assert_eq!(client.login_count(), 1);
        assert!(store.load(USER).is_ok());
    }

    #[tokio::test]
    async fn test_login_failure_is_surfaced() {
        let temp = tempdir().unwrap();
        let store = CredentialStore::new(temp.path().join("session.json"));
        let client = Arc::new(ScriptedClient::new(USER));
        client.push_login(Err(tether_client::Error::LoginRejected(
            "Invalid password".to_string(),
        )));

        let manager = manager(client, store.clone());
        let err = manager.login().await.unwrap_err();

        assert!(err.is_authentication());
        assert!(manager.session().is_none());
        assert!(!store.exists());
    }

    #[tokio::test]
    async fn test_login_failure_after_rejected_restore_keeps_old_file() {
        let temp = tempdir().unwrap();
        let store = CredentialStore::new(temp.path().join("session.json"));
        let old = Session::new(USER, "OLD", "stale");
        store.save(&old).unwrap();

        let client = Arc::new(ScriptedClient::new(USER));
        client.push_whoami(Err(unknown_token_error()));
        client.push_login(Err(tether_client::Error::LoginRejected("nope".into())));

        let manager = manager(client.clone(), store.clone());
        assert!(manager.login().await.unwrap_err().is_authentication());
        assert_eq!(client.access_token(), None);
        assert_eq!(store.load(USER).unwrap(), old);
    }

    /// Answers whoami only after `delay`.
    #[derive(Debug)]
    struct SlowWhoami {
        inner: ScriptedClient,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl RemoteAuthClient for SlowWhoami {
        async fn login(&self, p: &str, d: &str) -> tether_client::Result<Session> {
            self.inner.login(p, d).await
        }
        async fn whoami(&self) -> tether_client::Result<IdentityInfo> {
            tokio::time::sleep(self.delay).await;
            self.inner.whoami().await
        }
        async fn call(
            &self,
            r: &tether_client::ApiRequest,
        ) -> tether_client::Result<serde_json::Value> {
            self.inner.call(r).await
        }
        fn user_id(&self) -> String {
            self.inner.user_id()
        }
        fn device_id(&self) -> Option<String> {
            self.inner.device_id()
        }
        fn access_token(&self) -> Option<String> {
            self.inner.access_token()
        }
        fn restore_session(&self, s: &Session) {
            self.inner.restore_session(s)
        }
        fn clear_credentials(&self) {
            self.inner.clear_credentials()
        }
        async fn close(&self) {
            self.inner.close().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_timeout_falls_back_to_login() {
        let temp = tempdir().unwrap();
        let store = CredentialStore::new(temp.path().join("session.json"));
        store.save(&Session::new(USER, "DEV1", "tok1")).unwrap();

        let inner = ScriptedClient::new(USER);
        inner.push_login_ok("DEV2", "tok2");
        let client = Arc::new(SlowWhoami {
            inner,
            delay: Duration::from_secs(3600),
        });

        let manager = SessionManager::new(
            client.clone(),
            store,
            SessionManagerConfig::new(USER, "hunter2")
                .with_validation_timeout(Some(Duration::from_secs(5))),
        );
        let session = manager.login().await.unwrap();
        assert_eq!(session.device_id, "DEV2");
        assert_eq!(client.inner.login_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_validation_timeout_waits_for_whoami() {
        let temp = tempdir().unwrap();
        let store = CredentialStore::new(temp.path().join("session.json"));
        let saved = Session::new(USER, "DEV1", "tok1");
        store.save(&saved).unwrap();

        let client = Arc::new(SlowWhoami {
            inner: ScriptedClient::new(USER),
            delay: Duration::from_millis(5),
        });

        let config = SessionManagerConfig::new(USER, "hunter2")
            .with_validation_timeout(Some(Duration::ZERO));
        assert_eq!(config.validation_timeout, None);

        let manager = SessionManager::new(client.clone(), store, config);
        let session = manager.login().await.unwrap();

        assert_eq!(session, saved);
        assert_eq!(manager.login_source(), Some(LoginSource::Restored));
        assert_eq!(client.inner.login_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_logins_are_serialized() {
        let temp = tempdir().unwrap();
        let store = CredentialStore::new(temp.path().join("session.json"));
        let client = Arc::new(ScriptedClient::new(USER));
        client.push_login_ok("DEV1", "tok1");

        let manager = Arc::new(manager(client.clone(), store));
        let (a, b) = tokio::join!(manager.login(), manager.login());

        assert_eq!(a.unwrap(), b.unwrap());
        // The second caller restores what the first one saved.
        assert_eq!(client.login_count(), 1);
        assert_eq!(client.whoami_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_keeps_file() {
        let temp = tempdir().unwrap();
        let store = CredentialStore::new(temp.path().join("session.json"));
        let client = Arc::new(ScriptedClient::new(USER));
        client.push_login_ok("DEV1", "tok1");

        let manager = manager(client.clone(), store.clone());
        manager.login().await.unwrap();
        manager.invalidate();

        assert!(manager.session().is_none());
        assert_eq!(client.access_token(), None);
        assert!(store.exists());
    }

    #[test]
    fn test_config_debug_redacts_password() {
        let config = SessionManagerConfig::new(USER, "hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
        assert_eq!(config.device_name, DEFAULT_DEVICE_NAME);
    }
}
