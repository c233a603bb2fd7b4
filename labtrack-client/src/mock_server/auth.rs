//! Auth endpoints
//!
//! POST /api/auth/signin, /api/auth/register, /api/auth/logout,
//! /api/auth/refresh

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use labtrack_common::{LabEvent, TokenPair, UserProfile};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{MockState, MockUser};
use crate::api::{AuthSuccess, RegisterRequest};
use crate::error::{ApiError, ApiResult};

const MIN_PASSWORD_LEN: usize = 8;

/// POST /api/auth/signin request
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// POST /api/auth/logout and /api/auth/refresh request
#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

fn profile(user: &MockUser) -> UserProfile {
    UserProfile {
        id: Some(user.id.to_string()),
        email: Some(user.email.clone()),
        name: Some(user.name.clone()),
        picture: None,
        avatar: None,
    }
}

async fn success(state: &MockState, user: &MockUser) -> AuthSuccess {
    state.event_bus.emit_lossy(LabEvent::auth_changed());
    AuthSuccess {
        tokens: TokenPair {
            token: state.issue_token(user),
            refresh_token: Some(state.issue_refresh_token(user).await),
        },
        user: Some(profile(user)),
    }
}

/// POST /api/auth/signin
pub async fn sign_in(
    State(state): State<MockState>,
    Json(request): Json<SignInRequest>,
) -> ApiResult<Json<AuthSuccess>> {
    let email = request.email.trim().to_ascii_lowercase();
    let user = state.users.read().await.get(&email).cloned();

    match user {
        Some(user) if user.password == request.password => {
            tracing::info!(email = %email, "Mock sign-in");
            Ok(Json(success(&state, &user).await))
        }
        _ => {
            tracing::info!(email = %email, "Mock sign-in rejected");
            Err(ApiError::Unauthorized(
                "Invalid email or password".to_string(),
            ))
        }
    }
}

/// POST /api/auth/register
///
/// Returns 201 with a signed-in session for the new account.
pub async fn register(
    State(state): State<MockState>,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthSuccess>)> {
    let email = request.email.trim().to_ascii_lowercase();

    if request.name.trim().is_empty() {
        return Err(ApiError::BadRequest("Name is required".to_string()));
    }
    if !email.contains('@') {
        return Err(ApiError::BadRequest(format!("Invalid email: {}", request.email)));
    }
    if request.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }

    let user = {
        let mut users = state.users.write().await;
        if users.contains_key(&email) {
            let err = ApiError::Conflict(format!("Email already registered: {}", email));
            drop(users);
            state.record_error(&err).await;
            return Err(err);
        }

        let user = MockUser {
            id: Uuid::new_v4(),
            name: request.name.trim().to_string(),
            email: email.clone(),
            password: request.password,
        };
        users.insert(email.clone(), user.clone());
        user
    };

    tracing::info!(email = %email, "Mock account registered");
    Ok((StatusCode::CREATED, Json(success(&state, &user).await)))
}

/// POST /api/auth/logout
///
/// Forgets the refresh token if one is sent. Always succeeds.
pub async fn logout(
    State(state): State<MockState>,
    Json(request): Json<RefreshRequest>,
) -> Json<Value> {
    if let Some(refresh) = request.refresh_token {
        state.refresh_tokens.write().await.remove(&refresh);
    }
    state.event_bus.emit_lossy(LabEvent::auth_changed());
    tracing::info!("Mock logout");
    Json(json!({ "status": "signed_out" }))
}

/// POST /api/auth/refresh
///
/// Rotates the refresh token: the old one is spent.
pub async fn refresh(
    State(state): State<MockState>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let refresh = request
        .refresh_token
        .ok_or_else(|| ApiError::BadRequest("refresh_token is required".to_string()))?;

    let email = state
        .refresh_tokens
        .write()
        .await
        .remove(&refresh)
        .ok_or_else(|| ApiError::Unauthorized("Unknown refresh token".to_string()))?;

    let user = state
        .users
        .read()
        .await
        .get(&email)
        .cloned()
        .ok_or_else(|| ApiError::Unauthorized(format!("Account no longer exists: {}", email)))?;

    tracing::debug!(email = %email, "Mock token refresh");
    Ok(Json(success(&state, &user).await.tokens))
}

/// Build auth routes
pub fn auth_routes() -> Router<MockState> {
    Router::new()
        .route("/api/auth/signin", post(sign_in))
        .route("/api/auth/register", post(register))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/refresh", post(refresh))
}
