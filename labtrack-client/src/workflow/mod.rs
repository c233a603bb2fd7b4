//! Upload and analysis workflow engine
//!
//! Drives one `UploadSession` through Upload → Processing → Results:
//! - File selection (picker or drop) through a single validation path
//! - Auth gate before processing
//! - Simulated progress running alongside the analysis call
//! - Stale-run detection via generation counter and cancellation token
//!
//! Every state change is published twice: as `LabEvent`s on the shared bus
//! and as a fresh `WorkflowSnapshot` on a `watch` channel.

pub mod preview;
pub mod session;
pub mod validation;

pub use preview::{ObjectUrlRegistry, PreviewHandle, PreviewRegistry};
pub use session::{FileSummary, StepTransition, UploadSession, UploadStep, WorkflowSnapshot};
pub use validation::{validate_file, UploadError, UploadLimits};

use crate::api::AnalysisCollaborator;
use crate::error::ClientError;
use crate::models::{AnalysisResult, SelectedFile};
use crate::session::{AuthSession, RouteGuard};
use chrono::Utc;
use labtrack_common::config::{GuardConfig, ProcessingConfig};
use labtrack_common::events::LabEvent;
use labtrack_common::storage::LAST_ANALYSIS_KEY;
use labtrack_common::EventBus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tracing::{debug, info, warn};

/// Route the workflow lives behind
pub const UPLOAD_PATH: &str = "/upload";

/// Requests that do not fit the current step
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("No file selected")]
    NoFile,

    #[error("Analysis can only start from the upload step (currently {0})")]
    NotInUpload(UploadStep),
}

/// How a `start_analysis` call ended
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzeOutcome {
    /// Result committed, session now in Results
    Completed(AnalysisResult),
    /// Not signed in; session stays in Upload
    AuthRequired { location: String },
    /// Session moved on while the run was in flight; result discarded
    Superseded,
    /// Analysis call failed; session back in Upload with an inline error
    Failed { message: String },
}

/// Simulated progress pacing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressCadence {
    pub step: u8,
    pub interval: Duration,
}

impl ProgressCadence {
    pub fn from_config(config: &ProcessingConfig) -> Self {
        Self {
            step: config.progress_step.clamp(1, 100),
            interval: Duration::from_millis(config.step_interval_ms),
        }
    }
}

impl Default for ProgressCadence {
    fn default() -> Self {
        Self::from_config(&ProcessingConfig::default())
    }
}

/// Workflow engine; cheap to clone, all clones drive the same session
#[derive(Clone)]
pub struct Workflow {
    session: Arc<RwLock<UploadSession>>,
    auth: AuthSession,
    guard: RouteGuard,
    analyzer: Arc<dyn AnalysisCollaborator>,
    previews: Arc<dyn PreviewRegistry>,
    limits: UploadLimits,
    cadence: ProgressCadence,
    event_bus: EventBus,
    snapshots: Arc<watch::Sender<WorkflowSnapshot>>,
}

impl Workflow {
    pub fn builder(auth: AuthSession, analyzer: Arc<dyn AnalysisCollaborator>) -> WorkflowBuilder {
        WorkflowBuilder {
            auth,
            analyzer,
            previews: None,
            limits: UploadLimits::default(),
            cadence: ProgressCadence::default(),
            guard: GuardConfig::default(),
        }
    }

    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Current state
    pub async fn snapshot(&self) -> WorkflowSnapshot {
        self.session.read().await.snapshot()
    }

    /// Observe state changes
    pub fn watch(&self) -> watch::Receiver<WorkflowSnapshot> {
        self.snapshots.subscribe()
    }

    /// Accept a file from the picker
    ///
    /// On rejection only the inline error changes; file, preview, step and
    /// result stay as they were.
    pub async fn select_file(&self, file: SelectedFile) -> Result<(), UploadError> {
        let mut session = self.session.write().await;

        if let Err(e) = validate_file(&file, &self.limits) {
            info!(file = %file.name, mime_type = %file.mime_type, size = file.size, error = %e, "File rejected");
            session.set_error(e.message_key());
            self.publish(&session);
            return Err(e);
        }

        let preview = file
            .is_image()
            .then(|| PreviewHandle::acquire(self.previews.clone(), &file));

        info!(
            file = %file.name,
            mime_type = %file.mime_type,
            size = file.size,
            preview = preview.is_some(),
            "File accepted"
        );

        if let Some(transition) = session.accept_file(file, preview) {
            self.emit_transition(&transition);
        }
        self.publish(&session);
        Ok(())
    }

    /// Accept the first file of a drop
    pub async fn drop_files(&self, files: Vec<SelectedFile>) -> Result<(), UploadError> {
        match files.into_iter().next() {
            Some(file) => self.select_file(file).await,
            None => {
                let mut session = self.session.write().await;
                session.set_error(UploadError::Empty.message_key());
                self.publish(&session);
                Err(UploadError::Empty)
            }
        }
    }

    /// Run analysis on the selected file
    ///
    /// Requires a file and the Upload step. Unauthenticated callers get a
    /// sign-in redirect and the session does not move. Otherwise the session
    /// enters Processing, progress ticks from 0 to 100 while the analyzer
    /// runs, and Results is entered once both have finished.
    pub async fn start_analysis(&self) -> Result<AnalyzeOutcome, WorkflowError> {
        self.check_ready().await?;

        // Entry is gated on the session itself, whatever the guard's prefix list says
        if !self.auth.get_state().is_authenticated {
            let location = self.guard.sign_in_location(UPLOAD_PATH);
            info!(%location, "Analysis requires sign-in");
            return Ok(AnalyzeOutcome::AuthRequired { location });
        }

        let (session_id, generation, token, file) = {
            let mut session = self.session.write().await;
            // Re-check under the write lock
            let file = match (session.step(), session.file()) {
                (UploadStep::Upload, Some(file)) => file.clone(),
                (UploadStep::Upload, None) => return Err(WorkflowError::NoFile),
                (step, _) => return Err(WorkflowError::NotInUpload(step)),
            };

            let (generation, token, transition) = session.begin_processing();
            if let Some(transition) = transition {
                self.emit_transition(&transition);
            }
            self.emit_progress(&session, generation);
            self.publish(&session);
            (session.session_id(), generation, token, file)
        };

        info!(%session_id, generation, file = %file.name, "Analysis started");

        let run = async {
            tokio::try_join!(
                async {
                    self.tick_progress(generation).await;
                    Ok::<(), ClientError>(())
                },
                self.analyzer.analyze(&file)
            )
        };

        let outcome = tokio::select! {
            _ = token.cancelled() => {
                debug!(%session_id, generation, "Analysis run cancelled");
                return Ok(AnalyzeOutcome::Superseded);
            }
            outcome = run => outcome.map(|((), result)| result),
        };

        let mut session = self.session.write().await;
        let analyze_outcome = match outcome {
            Ok(result) => self.commit(&mut session, generation, result),
            Err(e) => self.record_failure(&mut session, generation, e),
        };
        self.publish(&session);
        Ok(analyze_outcome)
    }

    /// "Analyze another": back to a clean Upload step
    pub async fn reset(&self) {
        let mut session = self.session.write().await;
        if let Some(transition) = session.reset() {
            self.emit_transition(&transition);
        }
        debug!(session_id = %session.session_id(), "Workflow reset");
        self.publish(&session);
    }

    /// Leave the workflow through a caller-supplied navigation
    ///
    /// Session resources are released before `navigate` runs.
    pub async fn back<F: FnOnce()>(&self, navigate: F) {
        self.reset().await;
        navigate();
    }

    /// Owner is going away: stop any run and reset to the initial state
    pub async fn unmount(&self) {
        let mut session = self.session.write().await;
        if let Some(transition) = session.reset() {
            self.emit_transition(&transition);
        }
        debug!(session_id = %session.session_id(), "Workflow unmounted");
        self.publish(&session);
    }

    async fn check_ready(&self) -> Result<(), WorkflowError> {
        let session = self.session.read().await;
        match (session.step(), session.file()) {
            (UploadStep::Upload, Some(_)) => Ok(()),
            (UploadStep::Upload, None) => Err(WorkflowError::NoFile),
            (step, _) => Err(WorkflowError::NotInUpload(step)),
        }
    }

    /// Advance progress by the cadence step until 100 or the run goes stale
    async fn tick_progress(&self, generation: u64) {
        let mut progress: u8 = 0;

        while progress < 100 {
            tokio::time::sleep(self.cadence.interval).await;
            progress = progress.saturating_add(self.cadence.step).min(100);

            let mut session = self.session.write().await;
            if !session.advance_progress(generation, progress) {
                return;
            }
            self.emit_progress(&session, generation);
            self.publish(&session);
        }
    }

    fn commit(
        &self,
        session: &mut UploadSession,
        generation: u64,
        result: AnalysisResult,
    ) -> AnalyzeOutcome {
        let Some(transition) = session.complete(generation, result.clone()) else {
            debug!(generation, "Discarding stale analysis result");
            return AnalyzeOutcome::Superseded;
        };

        if let Some(transition) = transition {
            self.emit_transition(&transition);
        }
        self.event_bus.emit_lossy(LabEvent::AnalysisCompleted {
            session_id: session.session_id(),
            summary: result.summary.as_str().to_string(),
            timestamp: Utc::now(),
        });
        self.persist_last_analysis(&result);

        info!(
            session_id = %session.session_id(),
            summary = result.summary.as_str(),
            metrics = result.metrics.len(),
            "Analysis completed"
        );
        AnalyzeOutcome::Completed(result)
    }

    fn record_failure(
        &self,
        session: &mut UploadSession,
        generation: u64,
        error: ClientError,
    ) -> AnalyzeOutcome {
        let message = error.to_string();
        let Some(transition) = session.fail(generation, message.clone()) else {
            debug!(generation, error = %error, "Discarding stale analysis failure");
            return AnalyzeOutcome::Superseded;
        };

        if let Some(transition) = transition {
            self.emit_transition(&transition);
        }
        self.event_bus.emit_lossy(LabEvent::AnalysisFailed {
            session_id: session.session_id(),
            message: message.clone(),
            timestamp: Utc::now(),
        });

        // Credentials were already cleared by the API client
        if matches!(error, ClientError::Unauthorized) {
            warn!(session_id = %session.session_id(), "Analysis rejected, session expired");
            return AnalyzeOutcome::AuthRequired {
                location: self.guard.sign_in_location(UPLOAD_PATH),
            };
        }

        warn!(session_id = %session.session_id(), error = %message, "Analysis failed");
        AnalyzeOutcome::Failed { message }
    }

    fn persist_last_analysis(&self, result: &AnalysisResult) {
        let store = self.auth.credentials().store();
        let saved = serde_json::to_string(result)
            .map_err(labtrack_common::Error::from)
            .and_then(|json| store.set(LAST_ANALYSIS_KEY, &json));
        if let Err(e) = saved {
            warn!(error = %e, "Failed to persist last analysis");
        }
    }

    fn emit_transition(&self, transition: &StepTransition) {
        debug!(
            session_id = %transition.session_id,
            from = %transition.old_step,
            to = %transition.new_step,
            "Workflow step changed"
        );
        self.event_bus.emit_lossy(LabEvent::UploadStepChanged {
            session_id: transition.session_id,
            generation: transition.generation,
            old_step: transition.old_step,
            new_step: transition.new_step,
            timestamp: transition.transitioned_at,
        });
    }

    fn emit_progress(&self, session: &UploadSession, generation: u64) {
        self.event_bus.emit_lossy(LabEvent::UploadProgress {
            session_id: session.session_id(),
            generation,
            progress: session.progress(),
            timestamp: Utc::now(),
        });
    }

    fn publish(&self, session: &UploadSession) {
        self.snapshots.send_replace(session.snapshot());
    }
}

/// Assembles a `Workflow`
pub struct WorkflowBuilder {
    auth: AuthSession,
    analyzer: Arc<dyn AnalysisCollaborator>,
    previews: Option<Arc<dyn PreviewRegistry>>,
    limits: UploadLimits,
    cadence: ProgressCadence,
    guard: GuardConfig,
}

impl WorkflowBuilder {
    pub fn previews(mut self, previews: Arc<dyn PreviewRegistry>) -> Self {
        self.previews = Some(previews);
        self
    }

    pub fn limits(mut self, limits: UploadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn cadence(mut self, cadence: ProgressCadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn guard(mut self, guard: GuardConfig) -> Self {
        self.guard = guard;
        self
    }

    pub fn build(self) -> Workflow {
        let session = UploadSession::new();
        let (snapshots, _) = watch::channel(session.snapshot());
        let event_bus = self.auth.credentials().bus().clone();

        Workflow {
            session: Arc::new(RwLock::new(session)),
            guard: RouteGuard::new(self.auth.clone(), &self.guard),
            auth: self.auth,
            analyzer: self.analyzer,
            previews: self
                .previews
                .unwrap_or_else(|| Arc::new(ObjectUrlRegistry::new())),
            limits: self.limits,
            cadence: self.cadence,
            event_bus,
            snapshots: Arc::new(snapshots),
        }
    }
}
