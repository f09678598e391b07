//! Session, identity, and request types.

use std::fmt;

use reqwest::Method;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// An authenticated identity: who we are, which device, and the bearer token.
///
/// Serialized with exactly the `access_token`, `device_id` and `user_id`
/// fields; this is also the on-disk credential record layout.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub device_id: String,
    pub access_token: String,
}

impl Session {
    /// Create a session from its three parts.
    pub fn new(
        user_id: impl Into<String>,
        device_id: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            access_token: access_token.into(),
        }
    }

    /// True when every field is non-empty.
    pub fn is_complete(&self) -> bool {
        !self.user_id.is_empty() && !self.device_id.is_empty() && !self.access_token.is_empty()
    }

    /// Access token with everything but the last four characters hidden.
    pub fn masked_token(&self) -> String {
        mask_token(&self.access_token)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("device_id", &self.device_id)
            .field("access_token", &self.masked_token())
            .finish()
    }
}

/// Mask a secret for display.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Response of the "who am I" identity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityInfo {
    pub user_id: String,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub is_guest: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Generic requests
// ─────────────────────────────────────────────────────────────────────────────

/// A generic authenticated call against the client-server API.
///
/// `path` is relative to `/_matrix/client/v3/`.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// A GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    /// A POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
        }
    }

    /// Add a query parameter.
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Fetch the most recent `limit` events of a room, newest first.
    ///
    /// Room ids contain `!` and `:`, so the id is percent-encoded.
    pub fn room_messages(room_id: &str, limit: u32) -> Self {
        Self::get(format!("rooms/{}/messages", urlencoding::encode(room_id)))
            .with_query("dir", "b")
            .with_query("limit", limit.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    #[serde(rename = "type")]
    pub login_type: &'static str,
    pub identifier: UserIdentifier<'a>,
    pub password: &'a str,
    pub initial_device_display_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct UserIdentifier<'a> {
    #[serde(rename = "type")]
    pub id_type: &'static str,
    pub user: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub access_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_completeness() {
        assert!(Session::new("@a:x", "DEV", "tok").is_complete());
        assert!(!Session::new("", "DEV", "tok").is_complete());
        assert!(!Session::new("@a:x", "", "tok").is_complete());
        assert!(!Session::new("@a:x", "DEV", "").is_complete());
    }

    #[test]
    fn test_session_debug_hides_token() {
        let session = Session::new("@a:x", "DEV", "syt_supersecretvalue_abcd");
        let debug = format!("{:?}", session);
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("****abcd"));
    }

    #[test]
    fn test_session_field_names() {
        let json = serde_json::to_value(Session::new("@a:x", "DEV", "tok")).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["access_token", "device_id", "user_id"]);
    }

    #[test]
    fn test_mask_short_token() {
        assert_eq!(mask_token("abc"), "***");
        assert_eq!(mask_token(""), "");
    }

    #[test]
    fn test_room_messages_request() {
        let req = ApiRequest::room_messages("!room:example.org", 20);
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.path, "rooms/%21room%3Aexample.org/messages");
        assert!(req.query.contains(&("dir".to_string(), "b".to_string())));
        assert!(req.query.contains(&("limit".to_string(), "20".to_string())));
    }

    #[test]
    fn test_room_id_cannot_escape_its_segment() {
        let req = ApiRequest::room_messages("!a/b c:x", 1);
        assert_eq!(req.path, "rooms/%21a%2Fb%20c%3Ax/messages");
    }

    #[test]
    fn test_identity_defaults() {
        let info: IdentityInfo = serde_json::from_str(r#"{"user_id":"@a:x"}"#).unwrap();
        assert_eq!(info.device_id, None);
        assert!(!info.is_guest);
    }
}
