//! labtrack-client library interface
//!
//! Upload/analysis workflow, session/token manager, REST client wrapper, and
//! the mock backend, exposed for the `labtrack` binary and integration tests.

pub mod api;
pub mod error;
pub mod mock_server;
pub mod models;
pub mod report;
pub mod session;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult, ClientError, ClientResult};

use api::{AnalysisCollaborator, ApiClient, HttpAnalysisClient, HttpAuthClient};
use labtrack_common::config::ClientConfig;
use labtrack_common::{Credentials, EventBus, JsonFileStore, KeyValueStore};
use session::{AuthSession, RouteGuard, SocialLogin};
use std::sync::Arc;
use tracing::info;
use workflow::{ProgressCadence, UploadLimits, Workflow};

/// Capacity of the in-process event bus
pub const EVENT_BUS_CAPACITY: usize = 100;

/// Everything a client region needs, wired to one store and one bus
#[derive(Clone)]
pub struct ClientContext {
    pub config: ClientConfig,
    pub credentials: Credentials,
    pub api: ApiClient,
    pub auth: AuthSession,
    pub guard: RouteGuard,
    pub social: SocialLogin,
}

impl ClientContext {
    /// Wire a context over `store`
    pub fn new(config: ClientConfig, store: Arc<dyn KeyValueStore>) -> ClientResult<Self> {
        let credentials = Credentials::new(store, EventBus::new(EVENT_BUS_CAPACITY));
        let api = ApiClient::new(&config.api_base_url, credentials.clone())?;
        let auth = AuthSession::new(
            credentials.clone(),
            Arc::new(HttpAuthClient::new(api.clone())),
        );
        let guard = RouteGuard::new(auth.clone(), &config.guard);
        let social = SocialLogin::new(credentials.clone(), config.social.providers.clone());

        Ok(Self {
            config,
            credentials,
            api,
            auth,
            guard,
            social,
        })
    }

    /// Wire a context over the JSON store at the configured path
    pub fn open(config: ClientConfig) -> ClientResult<Self> {
        let path = config.resolved_storage_path();
        let store = JsonFileStore::open(&path)?;
        info!("Session store: {}", path.display());
        Self::new(config, Arc::new(store))
    }

    /// Workflow backed by the REST analysis endpoint
    pub fn workflow(&self) -> Workflow {
        self.workflow_with(Arc::new(HttpAnalysisClient::new(self.api.clone())))
    }

    /// Workflow backed by `analyzer`
    pub fn workflow_with(&self, analyzer: Arc<dyn AnalysisCollaborator>) -> Workflow {
        Workflow::builder(self.auth.clone(), analyzer)
            .limits(UploadLimits::from_config(&self.config.upload))
            .cadence(ProgressCadence::from_config(&self.config.processing))
            .guard(self.config.guard.clone())
            .build()
    }
}
