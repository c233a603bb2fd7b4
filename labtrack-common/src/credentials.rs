//! Persisted auth artifacts and the auth-changed broadcast
//!
//! `Credentials` is the single source of truth for authentication: the
//! persisted token plus a broadcast telling observers to re-read it. There
//! is no in-memory auth cache anywhere in the client.

use crate::events::{EventBus, LabEvent};
use crate::storage::{KeyValueStore, AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Access + refresh token as returned by the auth backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// User profile as cached alongside the token
///
/// Identity providers disagree on which fields they fill in, so every field
/// is optional and accessors spell out the fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Social-login providers use `picture`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Email/password accounts use `avatar`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

impl UserProfile {
    /// Name to show in the navigation bar
    pub fn display_name(&self) -> &str {
        match (&self.name, &self.email) {
            (Some(name), _) if !name.trim().is_empty() => name,
            (_, Some(email)) if !email.trim().is_empty() => email,
            _ => "User",
        }
    }

    /// Avatar image, preferring the provider picture
    pub fn avatar_url(&self) -> Option<&str> {
        self.picture.as_deref().or(self.avatar.as_deref())
    }
}

/// Store + bus pair every auth-aware component shares
#[derive(Clone)]
pub struct Credentials {
    store: Arc<dyn KeyValueStore>,
    bus: EventBus,
}

impl Credentials {
    pub fn new(store: Arc<dyn KeyValueStore>, bus: EventBus) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Persisted bearer token
    pub fn token(&self) -> Option<String> {
        self.store.get(AUTH_TOKEN_KEY)
    }

    /// Persisted refresh token
    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(REFRESH_TOKEN_KEY)
    }

    /// Cached user profile; a malformed entry reads as absent
    pub fn user(&self) -> Option<UserProfile> {
        let raw = self.store.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Cached user profile is malformed, ignoring");
                None
            }
        }
    }

    /// True if any auth artifact is present
    pub fn has_artifacts(&self) -> bool {
        [AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY]
            .iter()
            .any(|key| self.store.get(key).is_some())
    }

    /// Persist a token pair and (optionally) the user profile
    ///
    /// A pair without a refresh token removes any stale one.
    pub fn persist(&self, tokens: &TokenPair, user: Option<&UserProfile>) -> Result<()> {
        self.store.set(AUTH_TOKEN_KEY, &tokens.token)?;
        match &tokens.refresh_token {
            Some(refresh) => self.store.set(REFRESH_TOKEN_KEY, refresh)?,
            None => self.store.remove(REFRESH_TOKEN_KEY)?,
        }
        if let Some(user) = user {
            self.store.set(USER_KEY, &serde_json::to_string(user)?)?;
        }
        debug!("Auth artifacts persisted");
        Ok(())
    }

    /// Remove token, refresh token and cached user
    ///
    /// Idempotent. Every key is attempted even if an earlier removal fails;
    /// the first error is returned.
    pub fn clear(&self) -> Result<()> {
        let mut first_error = None;
        for key in [AUTH_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!(key, error = %e, "Failed to remove auth artifact");
                first_error.get_or_insert(e);
            }
        }
        debug!("Auth artifacts cleared");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Tell every observer to re-derive its auth state
    pub fn dispatch_change(&self) {
        debug!(subscribers = self.bus.subscriber_count(), "Dispatching auth change");
        self.bus.emit_lossy(LabEvent::auth_changed());
    }
}
