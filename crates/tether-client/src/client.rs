//! Remote auth client trait and the Matrix client-server implementation.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use url::Url;

use crate::error::{Error, ErrorResponse, Result};
use crate::types::{
    ApiRequest, IdentityInfo, LoginRequest, LoginResponse, Session, UserIdentifier,
};

/// Default timeout for requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Prefix of every client-server API path.
const API_PREFIX: &str = "_matrix/client/v3/";

// ============================================================================
// RemoteAuthClient Trait
// ============================================================================

/// The capability the session layer needs from a homeserver client.
///
/// Implementations hold the "current" credentials. `login` replaces them,
/// `restore_session` injects previously saved ones, and every other call uses
/// whatever is loaded.
#[async_trait]
pub trait RemoteAuthClient: Send + Sync + std::fmt::Debug {
    /// Log in with a password. On success the client adopts the new session.
    async fn login(&self, password: &str, device_display_name: &str) -> Result<Session>;

    /// Ask the homeserver who the current access token belongs to.
    async fn whoami(&self) -> Result<IdentityInfo>;

    /// Issue an authenticated call.
    async fn call(&self, request: &ApiRequest) -> Result<serde_json::Value>;

    /// The user id this client acts as.
    fn user_id(&self) -> String;

    /// The current device id, if logged in or restored.
    fn device_id(&self) -> Option<String>;

    /// The current access token, if logged in or restored.
    fn access_token(&self) -> Option<String>;

    /// Load a previously saved session into the client.
    fn restore_session(&self, session: &Session);

    /// Forget the access token and device id. The user id is kept.
    fn clear_credentials(&self);

    /// Release transport resources. Safe to call repeatedly.
    async fn close(&self);
}

// ============================================================================
// MatrixClient
// ============================================================================

#[derive(Debug, Default, Clone)]
struct Credentials {
    user_id: String,
    device_id: Option<String>,
    access_token: Option<String>,
}

/// Homeserver client speaking the Matrix client-server API over HTTP.
///
/// # Example
///
/// ```no_run
/// use tether_client::{MatrixClient, RemoteAuthClient};
///
/// # async fn example() -> tether_client::Result<()> {
/// let client = MatrixClient::builder()
///     .homeserver_url("https://matrix.example.org")
///     .user_id("@bot:example.org")
///     .build()?;
///
/// let session = client.login("hunter2", "tether").await?;
/// println!("logged in as {} on {}", session.user_id, session.device_id);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MatrixClient {
    homeserver: Url,
    timeout: Duration,
    user_agent: String,
    http: RwLock<Option<reqwest::Client>>,
    credentials: RwLock<Credentials>,
}

impl MatrixClient {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Get the homeserver base URL.
    pub fn homeserver(&self) -> &Url {
        &self.homeserver
    }

    /// Build a URL for a client-server API path.
    pub(crate) fn url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        self.homeserver
            .join(&format!("{}{}", API_PREFIX, path))
            .map_err(Error::from)
    }

    /// The HTTP client, rebuilt lazily after `close`.
    fn http(&self) -> Result<reqwest::Client> {
        if let Some(http) = self.http.read().as_ref() {
            return Ok(http.clone());
        }
        let http = build_http(&self.user_agent)?;
        *self.http.write() = Some(http.clone());
        Ok(http)
    }

    fn bearer(&self) -> Result<String> {
        self.credentials
            .read()
            .access_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(Error::NotLoggedIn)
    }

    /// Handle a response, extracting the body or error.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if response.status().is_success() {
            Ok(response.json().await?)
        } else {
            Err(self.extract_error(response).await)
        }
    }

    /// Extract an error from a failed response.
    async fn extract_error(&self, response: reqwest::Response) -> Error {
        let status = response.status().as_u16();

        match response.json::<ErrorResponse>().await {
            Ok(err) => Error::Api {
                status,
                errcode: err.errcode,
                message: err.error,
            },
            Err(_) => Error::Api {
                status,
                errcode: None,
                message: format!("HTTP {}", status),
            },
        }
    }
}

#[async_trait]
impl RemoteAuthClient for MatrixClient {
    async fn login(&self, password: &str, device_display_name: &str) -> Result<Session> {
        let (user_id, device_id) = {
            let creds = self.credentials.read();
            (creds.user_id.clone(), creds.device_id.clone())
        };

        let body = LoginRequest {
            login_type: "m.login.password",
            identifier: UserIdentifier {
                id_type: "m.id.user",
                user: &user_id,
            },
            password,
            initial_device_display_name: device_display_name,
            device_id: device_id.as_deref().filter(|d| !d.is_empty()),
        };

        let response = self
            .http()?
            .post(self.url("login")?)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;

        let login: LoginResponse = match self.handle_response(response).await {
            Ok(login) => login,
            Err(Error::Api {
                status: 403,
                message,
                ..
            }) => return Err(Error::LoginRejected(message)),
            Err(e) => return Err(e),
        };

        let session = Session::new(login.user_id, login.device_id, login.access_token);
        if !session.is_complete() {
            return Err(Error::LoginRejected(
                "login response is missing user_id, device_id or access_token".to_string(),
            ));
        }

        self.restore_session(&session);
        tracing::debug!(
            user_id = %session.user_id,
            device_id = %session.device_id,
            "Homeserver login succeeded"
        );
        Ok(session)
    }

    async fn whoami(&self) -> Result<IdentityInfo> {
        let token = self.bearer()?;
        let response = self
            .http()?
            .get(self.url("account/whoami")?)
            .bearer_auth(token)
            .timeout(self.timeout)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn call(&self, request: &ApiRequest) -> Result<serde_json::Value> {
        let token = self.bearer()?;
        let mut builder = self
            .http()?
            .request(request.method.clone(), self.url(&request.path)?)
            .bearer_auth(token)
            .timeout(self.timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        self.handle_response(response).await
    }

    fn user_id(&self) -> String {
        self.credentials.read().user_id.clone()
    }

    fn device_id(&self) -> Option<String> {
        self.credentials.read().device_id.clone()
    }

    fn access_token(&self) -> Option<String> {
        self.credentials.read().access_token.clone()
    }

    fn restore_session(&self, session: &Session) {
        let mut creds = self.credentials.write();
        creds.user_id = session.user_id.clone();
        creds.device_id = Some(session.device_id.clone());
        creds.access_token = Some(session.access_token.clone());
    }

    fn clear_credentials(&self) {
        let mut creds = self.credentials.write();
        creds.device_id = None;
        creds.access_token = None;
    }

    async fn close(&self) {
        if self.http.write().take().is_some() {
            tracing::debug!(homeserver = %self.homeserver, "Closed homeserver connection pool");
        }
    }
}

fn build_http(user_agent: &str) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .user_agent(user_agent)
        .build()?)
}

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for creating a MatrixClient.
#[derive(Debug)]
pub struct ClientBuilder {
    homeserver_url: Option<String>,
    user_id: Option<String>,
    timeout: Duration,
    user_agent: Option<String>,
}

impl ClientBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            homeserver_url: None,
            user_id: None,
            timeout: DEFAULT_TIMEOUT,
            user_agent: None,
        }
    }

    /// Set the homeserver base URL.
    pub fn homeserver_url(mut self, url: impl Into<String>) -> Self {
        self.homeserver_url = Some(url.into());
        self
    }

    /// Set the user id to log in as.
    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the per-request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<MatrixClient> {
        let homeserver = self
            .homeserver_url
            .ok_or_else(|| Error::Config("homeserver_url is required".to_string()))?;
        let user_id = self
            .user_id
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::Config("user_id is required".to_string()))?;

        // Parse and normalize base URL
        let mut homeserver = Url::parse(&homeserver)?;
        if !homeserver.path().ends_with('/') {
            homeserver.set_path(&format!("{}/", homeserver.path()));
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| format!("tether-client/{}", env!("CARGO_PKG_VERSION")));
        let http = build_http(&user_agent)?;

        Ok(MatrixClient {
            homeserver,
            timeout: self.timeout,
            user_agent,
            http: RwLock::new(Some(http)),
            credentials: RwLock::new(Credentials {
                user_id,
                ..Default::default()
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MatrixClient {
        ClientBuilder::new()
            .homeserver_url("http://localhost:8008")
            .user_id("@bot:localhost")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_homeserver() {
        let result = ClientBuilder::new().user_id("@bot:localhost").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_requires_user_id() {
        let result = ClientBuilder::new()
            .homeserver_url("http://localhost:8008")
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_builder_normalizes_trailing_slash() {
        assert_eq!(client().homeserver().as_str(), "http://localhost:8008/");
    }

    #[test]
    fn test_url_building() {
        let client = client();
        let url = client.url("account/whoami").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8008/_matrix/client/v3/account/whoami"
        );
        let url = client.url("/login").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8008/_matrix/client/v3/login");
    }

    #[test]
    fn test_restore_and_clear_credentials() {
        let client = client();
        assert_eq!(client.access_token(), None);

        client.restore_session(&Session::new("@bot:localhost", "DEV", "tok"));
        assert_eq!(client.device_id().as_deref(), Some("DEV"));
        assert_eq!(client.access_token().as_deref(), Some("tok"));

        client.clear_credentials();
        assert_eq!(client.device_id(), None);
        assert_eq!(client.access_token(), None);
        assert_eq!(client.user_id(), "@bot:localhost");
    }

    #[tokio::test]
    async fn test_whoami_without_token_is_not_logged_in() {
        let err = client().whoami().await.unwrap_err();
        assert!(matches!(err, Error::NotLoggedIn));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = client();
        client.close().await;
        client.close().await;
        assert!(client.http().is_ok());
    }
}
