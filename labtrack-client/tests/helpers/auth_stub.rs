//! Scripted auth collaborator and credential fixtures

use async_trait::async_trait;
use chrono::{Duration, Utc};
use labtrack_client::api::{AuthCollaborator, AuthSuccess, RegisterRequest};
use labtrack_client::error::{ClientError, ClientResult};
use labtrack_client::session::AuthSession;
use labtrack_common::token::{issue_unsigned_token, TokenClaims};
use labtrack_common::{Credentials, EventBus, MemoryStore, TokenPair, UserProfile};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const DEMO_EMAIL: &str = "demo@labtrack.local";
pub const DEMO_PASSWORD: &str = "demo1234";

/// Unsigned token whose `exp` is `lifetime` from now
pub fn token_expiring_in(lifetime: Duration) -> String {
    issue_unsigned_token(&TokenClaims {
        sub: Some("user-1".to_string()),
        email: Some(DEMO_EMAIL.to_string()),
        exp: Some((Utc::now() + lifetime).timestamp() as f64),
        iat: Some(Utc::now().timestamp() as f64),
    })
}

pub fn expired_token() -> String {
    token_expiring_in(Duration::minutes(-5))
}

pub fn demo_profile() -> UserProfile {
    UserProfile {
        id: Some("user-1".to_string()),
        email: Some(DEMO_EMAIL.to_string()),
        name: Some("Demo User".to_string()),
        picture: None,
        avatar: None,
    }
}

/// Auth collaborator with canned answers
///
/// Sign-in accepts only the demo account. Logout and refresh outcomes are
/// switchable per test.
#[derive(Default)]
pub struct ScriptedAuth {
    pub fail_logout: bool,
    pub refresh_result: Mutex<Option<TokenPair>>,
    pub logout_calls: AtomicUsize,
    pub last_logout_refresh: Mutex<Option<String>>,
}

impl ScriptedAuth {
    pub fn failing_logout() -> Self {
        Self {
            fail_logout: true,
            ..Default::default()
        }
    }

    pub fn refreshing_to(tokens: TokenPair) -> Self {
        Self {
            refresh_result: Mutex::new(Some(tokens)),
            ..Default::default()
        }
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthCollaborator for ScriptedAuth {
    async fn sign_in(&self, email: &str, password: &str) -> ClientResult<AuthSuccess> {
        if email == DEMO_EMAIL && password == DEMO_PASSWORD {
            Ok(AuthSuccess {
                tokens: TokenPair {
                    token: token_expiring_in(Duration::hours(1)),
                    refresh_token: Some("refresh-1".to_string()),
                },
                user: Some(demo_profile()),
            })
        } else {
            Err(ClientError::Status {
                status: 401,
                message: "Invalid email or password".to_string(),
            })
        }
    }

    async fn register(&self, request: &RegisterRequest) -> ClientResult<AuthSuccess> {
        Ok(AuthSuccess {
            tokens: TokenPair {
                token: token_expiring_in(Duration::hours(1)),
                refresh_token: None,
            },
            user: Some(UserProfile {
                name: Some(request.name.clone()),
                email: Some(request.email.clone()),
                ..Default::default()
            }),
        })
    }

    async fn logout(&self, refresh_token: Option<&str>) -> ClientResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_logout_refresh.lock().unwrap() = refresh_token.map(str::to_string);
        if self.fail_logout {
            Err(ClientError::Status {
                status: 503,
                message: "backend unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }

    async fn refresh_token(&self, _refresh_token: &str) -> ClientResult<TokenPair> {
        self.refresh_result
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::Status {
                status: 401,
                message: "Unknown refresh token".to_string(),
            })
    }
}

/// Fresh credentials over an in-memory store
pub fn signed_out() -> Credentials {
    Credentials::new(Arc::new(MemoryStore::new()), EventBus::new(100))
}

/// Credentials holding a token valid for an hour
pub fn signed_in() -> Credentials {
    let credentials = signed_out();
    credentials
        .persist(
            &TokenPair {
                token: token_expiring_in(Duration::hours(1)),
                refresh_token: Some("refresh-1".to_string()),
            },
            Some(&demo_profile()),
        )
        .unwrap();
    credentials
}

/// Session over `credentials` with a default scripted collaborator
pub fn auth_session(credentials: Credentials) -> AuthSession {
    AuthSession::new(credentials, Arc::new(ScriptedAuth::default()))
}
