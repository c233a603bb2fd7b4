//! Social login redirect and callback
//!
//! Only the client half of the flow: build the provider redirect, then read
//! the tokens the backend appends to the callback URL. The code-for-token
//! exchange happens server-side and is not modeled here.

use labtrack_common::{Credentials, TokenPair, UserProfile};
use reqwest::Url;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SocialLoginError {
    #[error("Unknown login provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Callback `state` does not match the one issued with the redirect
    #[error("Login state mismatch")]
    StateMismatch,

    /// Provider or backend reported an error in the callback
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Callback carried no token")]
    MissingToken,

    #[error("Could not save session: {0}")]
    Storage(String),
}

/// Redirect to send the user to, plus the state to check on return
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeRequest {
    pub url: Url,
    pub state: String,
}

/// Social login flow bound to the shared credentials
#[derive(Clone)]
pub struct SocialLogin {
    credentials: Credentials,
    providers: BTreeMap<String, String>,
}

impl SocialLogin {
    pub fn new(credentials: Credentials, providers: BTreeMap<String, String>) -> Self {
        Self {
            credentials,
            providers,
        }
    }

    /// Configured provider names
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    /// Build the provider redirect
    pub fn authorize_url(
        &self,
        provider: &str,
        redirect_uri: &str,
    ) -> Result<AuthorizeRequest, SocialLoginError> {
        let base = self
            .providers
            .get(provider)
            .ok_or_else(|| SocialLoginError::UnknownProvider(provider.to_string()))?;

        let mut url = Url::parse(base)
            .map_err(|e| SocialLoginError::InvalidUrl(format!("{}: {}", base, e)))?;
        let state = Uuid::new_v4().simple().to_string();

        url.query_pairs_mut()
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", &state);

        Ok(AuthorizeRequest { url, state })
    }

    /// Handle the callback URL
    ///
    /// On success the tokens (and profile, if present) are persisted. The
    /// auth broadcast fires whatever the outcome.
    pub fn complete(
        &self,
        callback_url: &str,
        expected_state: &str,
    ) -> Result<Option<UserProfile>, SocialLoginError> {
        let outcome = self.read_callback(callback_url, expected_state);

        match &outcome {
            Ok(_) => info!("Social login completed"),
            Err(e) => warn!(error = %e, "Social login failed"),
        }

        self.credentials.dispatch_change();
        outcome
    }

    fn read_callback(
        &self,
        callback_url: &str,
        expected_state: &str,
    ) -> Result<Option<UserProfile>, SocialLoginError> {
        let url = Url::parse(callback_url)
            .map_err(|e| SocialLoginError::InvalidUrl(format!("{}: {}", callback_url, e)))?;
        let params: BTreeMap<String, String> = url.query_pairs().into_owned().collect();

        if let Some(error) = params.get("error") {
            return Err(SocialLoginError::Provider(error.clone()));
        }

        if params.get("state").map(String::as_str) != Some(expected_state) {
            return Err(SocialLoginError::StateMismatch);
        }

        let token = params
            .get("token")
            .filter(|t| !t.is_empty())
            .ok_or(SocialLoginError::MissingToken)?;

        // A malformed profile does not fail the login
        let user = params.get("user").and_then(|raw| {
            serde_json::from_str::<UserProfile>(raw)
                .map_err(|e| warn!(error = %e, "Ignoring malformed profile in callback"))
                .ok()
        });

        let tokens = TokenPair {
            token: token.clone(),
            refresh_token: params.get("refresh_token").cloned(),
        };

        self.credentials
            .persist(&tokens, user.as_ref())
            .map_err(|e| SocialLoginError::Storage(e.to_string()))?;

        Ok(user)
    }
}
