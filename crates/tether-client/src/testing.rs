//! Scripted in-memory client for tests.
//!
//! Outcomes are queued per operation and handed out in order. When a queue
//! runs dry the client falls back to a predictable default:
//! - `login` fails with [`Error::LoginRejected`]
//! - `whoami` succeeds for whoever is loaded, or [`Error::NotLoggedIn`]
//! - `call` returns an empty JSON object

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::client::RemoteAuthClient;
use crate::error::{Error, Result};
use crate::types::{ApiRequest, IdentityInfo, Session};

/// An expired-token error as the homeserver reports it.
pub fn unknown_token_error() -> Error {
    Error::Api {
        status: 401,
        errcode: Some("M_UNKNOWN_TOKEN".to_string()),
        message: "Invalid access token passed.".to_string(),
    }
}

/// A non-auth server failure.
pub fn server_error() -> Error {
    Error::Api {
        status: 502,
        errcode: None,
        message: "Bad Gateway".to_string(),
    }
}

#[derive(Debug, Default)]
struct Loaded {
    device_id: Option<String>,
    access_token: Option<String>,
}

/// A [`RemoteAuthClient`] driven entirely by queued outcomes.
#[derive(Debug)]
pub struct ScriptedClient {
    user_id: String,
    loaded: RwLock<Loaded>,
    logins: Mutex<VecDeque<Result<Session>>>,
    whoamis: Mutex<VecDeque<Result<IdentityInfo>>>,
    calls: Mutex<VecDeque<Result<serde_json::Value>>>,
    login_count: AtomicUsize,
    whoami_count: AtomicUsize,
    call_count: AtomicUsize,
    close_count: AtomicUsize,
    call_log: Mutex<Vec<ApiRequest>>,
}

impl ScriptedClient {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            loaded: RwLock::new(Loaded::default()),
            logins: Mutex::new(VecDeque::new()),
            whoamis: Mutex::new(VecDeque::new()),
            calls: Mutex::new(VecDeque::new()),
            login_count: AtomicUsize::new(0),
            whoami_count: AtomicUsize::new(0),
            call_count: AtomicUsize::new(0),
            close_count: AtomicUsize::new(0),
            call_log: Mutex::new(Vec::new()),
        }
    }

    /// Queue a login outcome.
    pub fn push_login(&self, outcome: Result<Session>) -> &Self {
        self.logins.lock().push_back(outcome);
        self
    }

    /// Queue a successful login issuing `device_id` / `access_token`.
    pub fn push_login_ok(&self, device_id: &str, access_token: &str) -> &Self {
        let session = Session::new(self.user_id.clone(), device_id, access_token);
        self.push_login(Ok(session))
    }

    /// Queue a whoami outcome.
    pub fn push_whoami(&self, outcome: Result<IdentityInfo>) -> &Self {
        self.whoamis.lock().push_back(outcome);
        self
    }

    /// Queue a generic call outcome.
    pub fn push_call(&self, outcome: Result<serde_json::Value>) -> &Self {
        self.calls.lock().push_back(outcome);
        self
    }

    pub fn login_count(&self) -> usize {
        self.login_count.load(Ordering::SeqCst)
    }

    pub fn whoami_count(&self) -> usize {
        self.whoami_count.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }

    /// Requests seen by `call`, in order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.call_log.lock().clone()
    }
}

#[async_trait]
impl RemoteAuthClient for ScriptedClient {
    async fn login(&self, _password: &str, _device_display_name: &str) -> Result<Session> {
        self.login_count.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .logins
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Error::LoginRejected("no scripted login".to_string())));
        if let Ok(session) = &outcome {
            self.restore_session(session);
        }
        outcome
    }

    async fn whoami(&self) -> Result<IdentityInfo> {
        self.whoami_count.fetch_add(1, Ordering::SeqCst);
        if let Some(outcome) = self.whoamis.lock().pop_front() {
            return outcome;
        }
        let loaded = self.loaded.read();
        match &loaded.access_token {
            Some(_) => Ok(IdentityInfo {
                user_id: self.user_id.clone(),
                device_id: loaded.device_id.clone(),
                is_guest: false,
            }),
            None => Err(Error::NotLoggedIn),
        }
    }

    async fn call(&self, request: &ApiRequest) -> Result<serde_json::Value> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.call_log.lock().push(request.clone());
        self.calls
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(serde_json::json!({})))
    }

    fn user_id(&self) -> String {
        self.user_id.clone()
    }

    fn device_id(&self) -> Option<String> {
        self.loaded.read().device_id.clone()
    }

    fn access_token(&self) -> Option<String> {
        self.loaded.read().access_token.clone()
    }

    fn restore_session(&self, session: &Session) {
        let mut loaded = self.loaded.write();
        loaded.device_id = Some(session.device_id.clone());
        loaded.access_token = Some(session.access_token.clone());
    }

    fn clear_credentials(&self) {
        let mut loaded = self.loaded.write();
        loaded.device_id = None;
        loaded.access_token = None;
    }

    async fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}
