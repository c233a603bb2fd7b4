//! REST client wrapper
//!
//! `ApiClient` is the single place requests are built: base URL joining,
//! bearer token from the persisted store, JSON/multipart bodies, and error
//! mapping. A 401 from any endpoint means the persisted token is useless, so
//! the artifacts are cleared and the auth broadcast fires before the error is
//! returned.

pub mod analysis;
pub mod auth;

pub use analysis::{AnalysisCollaborator, FixtureAnalyzer, HttpAnalysisClient};
pub use auth::{AuthCollaborator, AuthSuccess, HttpAuthClient, RegisterRequest};

use crate::error::{ClientError, ClientResult};
use labtrack_common::Credentials;
use reqwest::{multipart::Form, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Thin reqwest wrapper bound to one backend
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
}

impl ApiClient {
    /// Build a client for `base_url`
    pub fn new(base_url: &str, credentials: Credentials) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Self::with_http_client(http, base_url, credentials)
    }

    /// Build a client around an existing reqwest client
    pub fn with_http_client(
        http: reqwest::Client,
        base_url: &str,
        credentials: Credentials,
    ) -> ClientResult<Self> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        // Url::join replaces the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Resolve an API path against the base URL
    pub fn url(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", path, e)))
    }

    /// GET `path`, decoding a JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let request = self.authorize(self.http.get(self.url(path)?));
        self.send(request).await
    }

    /// POST a JSON body to `path`, decoding a JSON body
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.authorize(self.http.post(self.url(path)?).json(body));
        self.send(request).await
    }

    /// POST a multipart form to `path`, decoding a JSON body
    pub async fn post_multipart<T: DeserializeOwned>(&self, path: &str, form: Form) -> ClientResult<T> {
        let request = self.authorize(self.http.post(self.url(path)?).multipart(form));
        self.send(request).await
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.credentials.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ClientResult<T> {
        let response = request.send().await?;
        let response = self.check_status(response).await?;

        let bytes = response.bytes().await?;
        // Empty 2xx bodies decode as JSON null
        let bytes = if bytes.is_empty() { &b"null"[..] } else { &bytes[..] };
        serde_json::from_slice(bytes).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn check_status(&self, response: Response) -> ClientResult<Response> {
        let status = response.status();
        debug!(url = %response.url(), status = status.as_u16(), "Backend response");

        if status == StatusCode::UNAUTHORIZED {
            warn!("Backend rejected credentials, clearing local session");
            if let Err(e) = self.credentials.clear() {
                warn!(error = %e, "Failed to clear auth artifacts");
            }
            self.credentials.dispatch_change();
            return Err(ClientError::Unauthorized);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: error_message(&body).unwrap_or_else(|| {
                    status.canonical_reason().unwrap_or("request failed").to_string()
                }),
            });
        }

        Ok(response)
    }
}

/// Pull `error.message` (or a bare `message`) out of an error body
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .pointer("/error/message")
        .or_else(|| value.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use labtrack_common::{EventBus, MemoryStore};
    use std::sync::Arc;

    fn client(base: &str) -> ApiClient {
        let credentials = Credentials::new(Arc::new(MemoryStore::new()), EventBus::new(10));
        ApiClient::new(base, credentials).unwrap()
    }

    #[test]
    fn test_url_joining_keeps_base_path() {
        let api = client("http://backend:9000/v1");
        assert_eq!(
            api.url("/api/analysis").unwrap().as_str(),
            "http://backend:9000/v1/api/analysis"
        );

        let root = client("http://backend:9000");
        assert_eq!(
            root.url("api/auth/signin").unwrap().as_str(),
            "http://backend:9000/api/auth/signin"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let credentials = Credentials::new(Arc::new(MemoryStore::new()), EventBus::new(10));
        assert!(matches!(
            ApiClient::new("not a url", credentials),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"error":{"code":"BAD_REQUEST","message":"nope"}}"#),
            Some("nope".to_string())
        );
        assert_eq!(error_message(r#"{"message":"flat"}"#), Some("flat".to_string()));
        assert_eq!(error_message("<html>"), None);
    }
}
