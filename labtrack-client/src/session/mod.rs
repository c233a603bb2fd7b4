//! Session / token manager
//!
//! Auth state is never stored in memory. It is derived on demand from the
//! persisted token, and every mutation (sign-in, logout, refresh, social
//! callback, a 401 from the backend) ends with an `AuthStateChanged`
//! broadcast so each observer re-derives it.
//!
//! - `AuthSession::get_state()` - derive now
//! - `AuthSession::subscribe()` - derive now, then again after each broadcast
//! - `AuthSession::dispatch_change()` - fire the broadcast

pub mod guard;
pub mod social;

pub use guard::{GuardDecision, RouteGuard};
pub use social::{AuthorizeRequest, SocialLogin, SocialLoginError};

use crate::api::{AuthCollaborator, AuthSuccess, RegisterRequest};
use labtrack_common::events::LabEvent;
use labtrack_common::token::{validate_token, TokenInfo};
use labtrack_common::{Credentials, UserProfile};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

/// Auth state as one observer sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthState {
    /// Token valid and not expired
    pub is_authenticated: bool,
    pub user: Option<UserProfile>,
    /// Only true before an observer's first check
    pub is_loading: bool,
}

impl AuthState {
    /// Placeholder shown before the first check completes
    pub fn loading() -> Self {
        Self {
            is_authenticated: false,
            user: None,
            is_loading: true,
        }
    }

    pub fn signed_out() -> Self {
        Self {
            is_authenticated: false,
            user: None,
            is_loading: false,
        }
    }
}

/// Token lifecycle and auth broadcast
#[derive(Clone)]
pub struct AuthSession {
    credentials: Credentials,
    collaborator: Arc<dyn AuthCollaborator>,
}

impl AuthSession {
    pub fn new(credentials: Credentials, collaborator: Arc<dyn AuthCollaborator>) -> Self {
        Self {
            credentials,
            collaborator,
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Validity of the persisted token right now
    pub fn token_info(&self) -> TokenInfo {
        validate_token(self.credentials.token().as_deref())
    }

    /// Derive auth state from the persisted token
    ///
    /// An invalid or expired token is swept: all artifacts are removed and
    /// the broadcast fires. Nothing is dispatched when there was nothing to
    /// remove, so observers re-deriving after a broadcast settle instead of
    /// echoing.
    pub fn get_state(&self) -> AuthState {
        let info = self.token_info();

        if info.is_valid && !info.is_expired {
            return AuthState {
                is_authenticated: true,
                user: self.credentials.user(),
                is_loading: false,
            };
        }

        if self.credentials.has_artifacts() {
            info!("Persisted token invalid or expired, signing out locally");
            if let Err(e) = self.credentials.clear() {
                warn!(error = %e, "Failed to clear auth artifacts");
            }
            self.credentials.dispatch_change();
        }

        AuthState::signed_out()
    }

    /// Start observing auth state
    ///
    /// The subscription is registered before the initial check so a change
    /// racing the check is not missed.
    pub fn subscribe(&self) -> AuthSubscription {
        let rx = self.credentials.bus().subscribe();
        let state = self.get_state();
        debug!(
            subscribers = self.credentials.bus().subscriber_count(),
            is_authenticated = state.is_authenticated,
            "Auth subscriber attached"
        );
        AuthSubscription {
            session: self.clone(),
            rx,
            state,
        }
    }

    /// Ask every observer to re-derive
    pub fn dispatch_change(&self) {
        self.credentials.dispatch_change();
    }

    /// Email/password sign-in
    pub async fn sign_in(&self, email: &str, password: &str) -> bool {
        let outcome = self.collaborator.sign_in(email, password).await;
        let ok = self.store_success("sign-in", outcome);
        self.dispatch_change();
        ok
    }

    /// Create an account and sign in with it
    pub async fn register(&self, request: &RegisterRequest) -> bool {
        let outcome = self.collaborator.register(request).await;
        let ok = self.store_success("register", outcome);
        self.dispatch_change();
        ok
    }

    /// Sign out
    ///
    /// Remote invalidation is best-effort; local artifacts are always
    /// removed. Returns whether the remote call succeeded.
    pub async fn logout(&self) -> bool {
        let refresh = self.credentials.refresh_token();

        let remote_ok = match self.collaborator.logout(refresh.as_deref()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Remote logout failed, signing out locally anyway");
                false
            }
        };

        if let Err(e) = self.credentials.clear() {
            warn!(error = %e, "Failed to clear auth artifacts");
        }
        self.dispatch_change();
        info!(remote_ok, "Signed out");
        remote_ok
    }

    /// Exchange the refresh token for a new pair
    ///
    /// Without a refresh token, or when the exchange fails, the local
    /// session is cleared.
    pub async fn refresh_token(&self) -> bool {
        let ok = match self.credentials.refresh_token() {
            None => {
                debug!("No refresh token, clearing session");
                false
            }
            Some(refresh) => match self.collaborator.refresh_token(&refresh).await {
                // User profile is left as cached
                Ok(tokens) => match self.credentials.persist(&tokens, None) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!(error = %e, "Failed to persist refreshed tokens");
                        false
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Token refresh failed");
                    false
                }
            },
        };

        if !ok {
            if let Err(e) = self.credentials.clear() {
                warn!(error = %e, "Failed to clear auth artifacts");
            }
        }
        self.dispatch_change();
        ok
    }

    fn store_success(
        &self,
        operation: &'static str,
        outcome: crate::error::ClientResult<AuthSuccess>,
    ) -> bool {
        match outcome {
            Ok(success) => match self.credentials.persist(&success.tokens, success.user.as_ref()) {
                Ok(()) => {
                    info!(operation, "Authenticated");
                    true
                }
                Err(e) => {
                    warn!(operation, error = %e, "Failed to persist auth artifacts");
                    false
                }
            },
            Err(e) => {
                warn!(operation, error = %e, "Authentication failed");
                false
            }
        }
    }
}

/// One observer's live view of auth state
///
/// Dropping it detaches from the broadcast.
pub struct AuthSubscription {
    session: AuthSession,
    rx: broadcast::Receiver<LabEvent>,
    state: AuthState,
}

impl AuthSubscription {
    /// State as of the last check
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Wait for the next auth broadcast and re-derive
    ///
    /// Returns `None` once the bus is gone. Lagging behind counts as a
    /// change.
    pub async fn changed(&mut self) -> Option<AuthState> {
        loop {
            match self.rx.recv().await {
                Ok(LabEvent::AuthStateChanged { .. }) | Err(RecvError::Lagged(_)) => {
                    self.state = self.session.get_state();
                    return Some(self.state.clone());
                }
                Ok(_) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    }
}
