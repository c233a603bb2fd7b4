//! Analysis collaborator
//!
//! Accepts a file, returns an `AnalysisResult`. The workflow awaits it as an
//! opaque call.

use super::ApiClient;
use crate::error::{ClientError, ClientResult};
use crate::models::{AnalysisResult, SelectedFile};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::debug;

/// Remote side of analysis
#[async_trait]
pub trait AnalysisCollaborator: Send + Sync {
    async fn analyze(&self, file: &SelectedFile) -> ClientResult<AnalysisResult>;
}

/// Multipart upload to `POST /api/analysis`
#[derive(Clone)]
pub struct HttpAnalysisClient {
    api: ApiClient,
}

impl HttpAnalysisClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl AnalysisCollaborator for HttpAnalysisClient {
    async fn analyze(&self, file: &SelectedFile) -> ClientResult<AnalysisResult> {
        debug!(file = %file.name, size = file.size, "Uploading file for analysis");

        let part = Part::bytes(file.contents.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)
            .map_err(ClientError::Transport)?;
        let form = Form::new().part("file", part);

        self.api.post_multipart("/api/analysis", form).await
    }
}

/// Local stand-in returning a fixed result after an optional delay
#[derive(Debug, Clone)]
pub struct FixtureAnalyzer {
    result: AnalysisResult,
    delay: Duration,
}

impl FixtureAnalyzer {
    /// Canonical fixture, no delay
    pub fn new() -> Self {
        Self::with_result(AnalysisResult::fixture())
    }

    pub fn with_result(result: AnalysisResult) -> Self {
        Self {
            result,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Default for FixtureAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AnalysisCollaborator for FixtureAnalyzer {
    async fn analyze(&self, file: &SelectedFile) -> ClientResult<AnalysisResult> {
        debug!(file = %file.name, "Fixture analysis");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.result.clone())
    }
}
