//! services/client/src/adapters/http.rs
//!
//! The HTTP plumbing shared by every backend adapter: one `reqwest` client,
//! the project URL, the public API key, and the access token of the signed-in
//! user. The auth adapter writes the token; the others read it.

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::warn;

use campus_swap_core::ports::{PortError, PortResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone)]
pub struct BackendHttp {
    client: Client,
    base_url: Arc<str>,
    anon_key: Arc<str>,
    access_token: Arc<RwLock<Option<String>>>,
}

impl BackendHttp {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            anon_key: Arc::from(anon_key),
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// The realtime endpoint: the project URL with a websocket scheme.
    pub fn websocket_url(&self) -> String {
        let ws_base = self
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base, self.anon_key
        )
    }

    pub async fn set_access_token(&self, token: Option<String>) {
        *self.access_token.write().await = token;
    }

    /// The user's token, or the public key when nobody is signed in.
    pub async fn bearer(&self) -> String {
        self.access_token
            .read()
            .await
            .clone()
            .unwrap_or_else(|| self.anon_key.to_string())
    }

    /// A request carrying the API key and the current bearer token.
    pub async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .header("apikey", self.anon_key.as_ref())
            .bearer_auth(self.bearer().await)
    }

    /// Sends the request and decodes a JSON body, mapping failures to `PortError`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> PortResult<T> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| PortError::Unexpected(format!("failed to decode response: {}", e)))
    }

    /// Sends the request and checks the status, ignoring the body on success.
    pub async fn send(&self, request: RequestBuilder) -> PortResult<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| PortError::Backend(format!("network error: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        warn!(status = status.as_u16(), body = %body, "Backend request failed");
        Err(status_error(status, &body))
    }
}

/// Maps a failed response to a `PortError`, keeping the backend's message.
pub fn status_error(status: StatusCode, body: &str) -> PortError {
    let message = error_message(body).unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::NOT_FOUND => PortError::NotFound(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PortError::Unauthorized,
        _ => PortError::Backend(message),
    }
}

/// The human-readable message in a backend error body. Auth, REST and storage
/// each use a different field for it.
pub fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["error_description", "msg", "message", "error"]
        .iter()
        .find_map(|field| value.get(field)?.as_str().map(str::to_string))
        .filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_the_descriptive_field() {
        let auth = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert_eq!(error_message(auth).as_deref(), Some("Invalid login credentials"));

        let signup = r#"{"code":422,"msg":"User already registered"}"#;
        assert_eq!(error_message(signup).as_deref(), Some("User already registered"));

        let rest = r#"{"code":"23503","message":"insert or update violates foreign key"}"#;
        assert_eq!(
            error_message(rest).as_deref(),
            Some("insert or update violates foreign key")
        );

        assert_eq!(error_message("<html>bad gateway</html>"), None);
    }

    #[test]
    fn status_error_keeps_backend_message() {
        let err = status_error(
            StatusCode::BAD_REQUEST,
            r#"{"error_description":"Invalid login credentials"}"#,
        );
        assert_eq!(err, PortError::Backend("Invalid login credentials".to_string()));
        assert_eq!(status_error(StatusCode::FORBIDDEN, ""), PortError::Unauthorized);
        assert!(matches!(status_error(StatusCode::NOT_FOUND, ""), PortError::NotFound(_)));
    }

    #[test]
    fn websocket_url_swaps_scheme() {
        let http = BackendHttp::new("https://abc.supabase.co/", "anon").unwrap();
        assert_eq!(
            http.websocket_url(),
            "wss://abc.supabase.co/realtime/v1/websocket?apikey=anon&vsn=1.0.0"
        );
        assert_eq!(http.url("/rest/v1/objects"), "https://abc.supabase.co/rest/v1/objects");
    }

    #[tokio::test]
    async fn bearer_falls_back_to_anon_key() {
        let http = BackendHttp::new("http://localhost:54321", "anon").unwrap();
        assert_eq!(http.bearer().await, "anon");
        http.set_access_token(Some("user-jwt".to_string())).await;
        assert_eq!(http.clone().bearer().await, "user-jwt");
    }
}
