//! Route guard
//!
//! Protected paths require an authenticated session; everything else passes.
//! Unauthenticated access is redirected to sign-in with a `returnTo`
//! parameter so the user lands back where they started.

use super::AuthSession;
use labtrack_common::config::GuardConfig;
use reqwest::Url;
use tracing::debug;

/// What the router should do with a navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    RedirectToSignIn {
        /// Sign-in path with `returnTo` query
        location: String,
    },
}

/// Gate in front of protected routes and workflow entry
#[derive(Clone)]
pub struct RouteGuard {
    auth: AuthSession,
    protected_prefixes: Vec<String>,
    sign_in_path: String,
}

impl RouteGuard {
    pub fn new(auth: AuthSession, config: &GuardConfig) -> Self {
        Self {
            auth,
            protected_prefixes: config.protected_prefixes.clone(),
            sign_in_path: config.sign_in_path.clone(),
        }
    }

    /// Whether `path` needs authentication
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected_prefixes.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/') || rest.starts_with('?'))
        })
    }

    /// Decide whether navigation to `path` may proceed
    pub fn check(&self, path: &str) -> GuardDecision {
        if !self.is_protected(path) {
            return GuardDecision::Allow;
        }

        if self.auth.get_state().is_authenticated {
            GuardDecision::Allow
        } else {
            debug!(path, "Guard redirecting to sign-in");
            GuardDecision::RedirectToSignIn {
                location: self.sign_in_location(path),
            }
        }
    }

    /// Sign-in path carrying `return_to`
    pub fn sign_in_location(&self, return_to: &str) -> String {
        // Parse against a dummy origin just to get query encoding
        match Url::parse("http://localhost").and_then(|base| base.join(&self.sign_in_path)) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("returnTo", return_to);
                match url.query() {
                    Some(query) => format!("{}?{}", url.path(), query),
                    None => url.path().to_string(),
                }
            }
            Err(_) => self.sign_in_path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AuthCollaborator, AuthSuccess, RegisterRequest};
    use crate::error::{ClientError, ClientResult};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use labtrack_common::token::{issue_unsigned_token, TokenClaims};
    use labtrack_common::{Credentials, EventBus, MemoryStore, TokenPair};
    use std::sync::Arc;

    struct Offline;

    #[async_trait]
    impl AuthCollaborator for Offline {
        async fn sign_in(&self, _: &str, _: &str) -> ClientResult<AuthSuccess> {
            Err(ClientError::Decode("offline".to_string()))
        }
        async fn register(&self, _: &RegisterRequest) -> ClientResult<AuthSuccess> {
            Err(ClientError::Decode("offline".to_string()))
        }
        async fn logout(&self, _: Option<&str>) -> ClientResult<()> {
            Ok(())
        }
        async fn refresh_token(&self, _: &str) -> ClientResult<TokenPair> {
            Err(ClientError::Decode("offline".to_string()))
        }
    }

    fn guard() -> (RouteGuard, Credentials) {
        let credentials = Credentials::new(Arc::new(MemoryStore::new()), EventBus::new(10));
        let auth = AuthSession::new(credentials.clone(), Arc::new(Offline));
        (RouteGuard::new(auth, &GuardConfig::default()), credentials)
    }

    #[test]
    fn test_prefix_matching() {
        let (guard, _) = guard();
        assert!(guard.is_protected("/upload"));
        assert!(guard.is_protected("/upload/step"));
        assert!(guard.is_protected("/results?id=1"));
        assert!(!guard.is_protected("/uploads-info"));
        assert!(!guard.is_protected("/"));
        assert!(!guard.is_protected("/signin"));
    }

    #[test]
    fn test_unauthenticated_redirect_carries_return_to() {
        let (guard, _) = guard();
        assert_eq!(guard.check("/about"), GuardDecision::Allow);
        assert_eq!(
            guard.check("/upload"),
            GuardDecision::RedirectToSignIn {
                location: "/signin?returnTo=%2Fupload".to_string()
            }
        );
    }

    #[test]
    fn test_authenticated_passes() {
        let (guard, credentials) = guard();
        let token = issue_unsigned_token(&TokenClaims {
            exp: Some((Utc::now() + Duration::hours(1)).timestamp() as f64),
            ..Default::default()
        });
        credentials
            .persist(&TokenPair { token, refresh_token: None }, None)
            .unwrap();

        assert_eq!(guard.check("/results"), GuardDecision::Allow);
    }
}
