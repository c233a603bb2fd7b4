//! Auth collaborator
//!
//! The session manager only needs success/failure plus the token pair and
//! profile on success. `HttpAuthClient` talks to `/api/auth/*`.

use super::ApiClient;
use crate::error::ClientResult;
use async_trait::async_trait;
use labtrack_common::{TokenPair, UserProfile};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Successful sign-in / registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSuccess {
    #[serde(flatten)]
    pub tokens: TokenPair,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Account registration form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Remote side of authentication
#[async_trait]
pub trait AuthCollaborator: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> ClientResult<AuthSuccess>;

    async fn register(&self, request: &RegisterRequest) -> ClientResult<AuthSuccess>;

    /// Invalidate the session server-side
    async fn logout(&self, refresh_token: Option<&str>) -> ClientResult<()>;

    /// Exchange a refresh token for a new pair
    async fn refresh_token(&self, refresh_token: &str) -> ClientResult<TokenPair>;
}

/// `AuthCollaborator` over the REST backend
#[derive(Clone)]
pub struct HttpAuthClient {
    api: ApiClient,
}

impl HttpAuthClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl AuthCollaborator for HttpAuthClient {
    async fn sign_in(&self, email: &str, password: &str) -> ClientResult<AuthSuccess> {
        self.api
            .post_json(
                "/api/auth/signin",
                &json!({ "email": email, "password": password }),
            )
            .await
    }

    async fn register(&self, request: &RegisterRequest) -> ClientResult<AuthSuccess> {
        self.api.post_json("/api/auth/register", request).await
    }

    async fn logout(&self, refresh_token: Option<&str>) -> ClientResult<()> {
        let _: Value = self
            .api
            .post_json("/api/auth/logout", &json!({ "refresh_token": refresh_token }))
            .await?;
        Ok(())
    }

    async fn refresh_token(&self, refresh_token: &str) -> ClientResult<TokenPair> {
        self.api
            .post_json("/api/auth/refresh", &json!({ "refresh_token": refresh_token }))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_success_wire_shape() {
        let json = r#"{
            "token": "a.b.c",
            "refresh_token": "r-1",
            "user": {"email": "demo@labtrack.local", "name": "Demo"}
        }"#;

        let success: AuthSuccess = serde_json::from_str(json).unwrap();
        assert_eq!(success.tokens.token, "a.b.c");
        assert_eq!(success.tokens.refresh_token.as_deref(), Some("r-1"));
        assert_eq!(success.user.unwrap().display_name(), "Demo");
    }

    #[test]
    fn test_auth_success_without_user() {
        let success: AuthSuccess = serde_json::from_str(r#"{"token": "a.b.c"}"#).unwrap();
        assert_eq!(success.tokens.refresh_token, None);
        assert_eq!(success.user, None);
    }
}
