//! Mock backend
//!
//! In-memory stand-in for the LabTrack REST API, used by the CLI's
//! `serve-mock` command and by integration tests:
//! - `/api/auth/*` sign-in, registration, logout, refresh
//! - `POST /api/analysis` multipart upload returning the fixture result
//! - `GET /health`, `GET /events`

pub mod analysis;
pub mod auth;
pub mod events;
pub mod health;

use crate::workflow::UploadLimits;
use axum::{extract::DefaultBodyLimit, http::HeaderMap, Router};
use chrono::{DateTime, Duration, Utc};
use labtrack_common::token::{issue_unsigned_token, validate_token, TokenClaims};
use labtrack_common::EventBus;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::error::ApiError;

/// Account seeded into every mock backend
pub const DEMO_EMAIL: &str = "demo@labtrack.local";
pub const DEMO_PASSWORD: &str = "demo1234";
pub const DEMO_NAME: &str = "Demo User";

/// Registered account
#[derive(Debug, Clone)]
pub struct MockUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Shared state for mock handlers
#[derive(Clone)]
pub struct MockState {
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Accounts keyed by lowercase email
    pub users: Arc<RwLock<HashMap<String, MockUser>>>,
    /// Outstanding refresh tokens → account email
    pub refresh_tokens: Arc<RwLock<HashMap<String, String>>>,
    /// Upload limits enforced on `/api/analysis`
    pub limits: UploadLimits,
    /// Lifetime of issued access tokens
    pub token_lifetime: Duration,
    /// Startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last handler error, for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl MockState {
    pub fn new(event_bus: EventBus, limits: UploadLimits) -> Self {
        let demo = MockUser {
            id: Uuid::new_v4(),
            name: DEMO_NAME.to_string(),
            email: DEMO_EMAIL.to_string(),
            password: DEMO_PASSWORD.to_string(),
        };
        let mut users = HashMap::new();
        users.insert(demo.email.clone(), demo);

        Self {
            event_bus,
            users: Arc::new(RwLock::new(users)),
            refresh_tokens: Arc::new(RwLock::new(HashMap::new())),
            limits,
            token_lifetime: Duration::hours(1),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    pub fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Issue an access token for `user`
    pub fn issue_token(&self, user: &MockUser) -> String {
        let now = Utc::now();
        issue_unsigned_token(&TokenClaims {
            sub: Some(user.id.to_string()),
            email: Some(user.email.clone()),
            exp: Some(self.expiry_from(now).timestamp() as f64),
            iat: Some(now.timestamp() as f64),
        })
    }

    /// Expiry for a token issued at `now`, saturating at the latest
    /// representable instant
    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_add_signed(self.token_lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Issue and record a refresh token for `user`
    pub async fn issue_refresh_token(&self, user: &MockUser) -> String {
        let refresh = Uuid::new_v4().simple().to_string();
        self.refresh_tokens
            .write()
            .await
            .insert(refresh.clone(), user.email.clone());
        refresh
    }

    /// Require a valid, unexpired bearer token
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let token = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));

        let info = validate_token(token);
        if info.is_valid && !info.is_expired {
            Ok(())
        } else {
            Err(ApiError::Unauthorized(
                "Missing or expired bearer token".to_string(),
            ))
        }
    }

    pub async fn record_error(&self, error: &ApiError) {
        *self.last_error.write().await = Some(error.to_string());
    }
}

/// Build the mock backend router
pub fn build_router(state: MockState) -> Router {
    // 1 MB headroom for multipart framing; anything past it is cut off by
    // axum before the handler runs
    let body_limit = usize::try_from(state.limits.max_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(1024 * 1024);

    Router::new()
        .merge(auth::auth_routes())
        .merge(analysis::analysis_routes())
        .merge(health::health_routes())
        .merge(events::event_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the mock backend on `addr` until `shutdown` resolves
pub async fn serve<F>(state: MockState, addr: SocketAddr, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Mock backend listening on http://{}", listener.local_addr()?);
    info!("Health check: http://{}/health", listener.local_addr()?);
    info!("Demo account: {} / {}", DEMO_EMAIL, DEMO_PASSWORD);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Mock backend stopped");
    Ok(())
}
