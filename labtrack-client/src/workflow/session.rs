//! Upload workflow state machine
//!
//! Upload → Processing → Results, back to Upload on reset. A failed analysis
//! returns to Upload with an inline error.
//!
//! Each processing run gets a generation number and a cancellation token.
//! Anything that moves the session on (new file, reset, unmount) bumps the
//! generation and cancels the token, so a run that finishes late can tell
//! its result no longer belongs here.

use super::preview::PreviewHandle;
use crate::models::{AnalysisResult, SelectedFile};
use chrono::{DateTime, Utc};
use labtrack_common::events::StepKind;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Which view the session is on
pub type UploadStep = StepKind;

/// Step transition record
#[derive(Debug, Clone, Serialize)]
pub struct StepTransition {
    pub session_id: Uuid,
    pub generation: u64,
    pub old_step: UploadStep,
    pub new_step: UploadStep,
    pub transitioned_at: DateTime<Utc>,
}

/// File metadata shown in views
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileSummary {
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

/// Read-only view of an upload session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSnapshot {
    pub session_id: Uuid,
    pub generation: u64,
    pub step: UploadStep,
    pub progress: u8,
    pub file: Option<FileSummary>,
    pub preview_url: Option<String>,
    pub error: Option<String>,
    pub result: Option<AnalysisResult>,
}

/// One in-progress file analysis attempt
#[derive(Debug)]
pub struct UploadSession {
    session_id: Uuid,
    file: Option<SelectedFile>,
    preview: Option<PreviewHandle>,
    step: UploadStep,
    progress: u8,
    error: Option<String>,
    result: Option<AnalysisResult>,
    generation: u64,
    active_run: Option<CancellationToken>,
}

impl UploadSession {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            file: None,
            preview: None,
            step: UploadStep::Upload,
            progress: 0,
            error: None,
            result: None,
            generation: 0,
            active_run: None,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn step(&self) -> UploadStep {
        self.step
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn file(&self) -> Option<&SelectedFile> {
        self.file.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.result.as_ref()
    }

    pub fn preview_url(&self) -> Option<&str> {
        self.preview
            .as_ref()
            .filter(|p| !p.is_released())
            .map(PreviewHandle::url)
    }

    /// Whether `generation` is still the live processing run
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.step == UploadStep::Processing
    }

    /// Record an inline message without touching anything else
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Take a validated file
    ///
    /// Supersedes any in-flight run, drops a previous result, and swaps the
    /// preview (old one released before the new one is stored).
    pub fn accept_file(
        &mut self,
        file: SelectedFile,
        preview: Option<PreviewHandle>,
    ) -> Option<StepTransition> {
        self.invalidate_run();
        self.release_preview();

        self.file = Some(file);
        self.preview = preview;
        self.error = None;
        self.result = None;
        self.progress = 0;

        self.transition_to(UploadStep::Upload)
    }

    /// Enter Processing; returns the run's generation and cancel token
    pub fn begin_processing(&mut self) -> (u64, CancellationToken, Option<StepTransition>) {
        self.invalidate_run();

        let token = CancellationToken::new();
        self.active_run = Some(token.clone());
        self.progress = 0;
        self.error = None;
        self.result = None;

        let transition = self.transition_to(UploadStep::Processing);
        (self.generation, token, transition)
    }

    /// Advance progress for the live run; never moves backwards
    ///
    /// Returns false when `generation` is stale.
    pub fn advance_progress(&mut self, generation: u64, progress: u8) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.progress = self.progress.max(progress.min(100));
        true
    }

    /// Commit a result from run `generation`
    ///
    /// Returns `None` (and changes nothing) when the run is stale.
    pub fn complete(
        &mut self,
        generation: u64,
        result: AnalysisResult,
    ) -> Option<Option<StepTransition>> {
        if !self.is_current(generation) {
            return None;
        }

        self.progress = 100;
        self.result = Some(result);
        self.active_run = None;
        // Results view does not show the preview
        self.release_preview();
        Some(self.transition_to(UploadStep::Results))
    }

    /// Record a failed run and go back to Upload, keeping the file
    ///
    /// Returns `None` when the run is stale.
    pub fn fail(
        &mut self,
        generation: u64,
        message: impl Into<String>,
    ) -> Option<Option<StepTransition>> {
        if !self.is_current(generation) {
            return None;
        }

        self.progress = 0;
        self.error = Some(message.into());
        self.active_run = None;
        Some(self.transition_to(UploadStep::Upload))
    }

    /// Back to the initial state, releasing every resource
    pub fn reset(&mut self) -> Option<StepTransition> {
        self.invalidate_run();
        self.release_preview();

        self.file = None;
        self.error = None;
        self.result = None;
        self.progress = 0;

        self.transition_to(UploadStep::Upload)
    }

    /// Stop whatever run is in flight and make its generation stale
    pub fn invalidate_run(&mut self) {
        if let Some(token) = self.active_run.take() {
            token.cancel();
        }
        self.generation += 1;
    }

    /// Release and drop the preview; safe to call repeatedly
    pub fn release_preview(&mut self) {
        if let Some(mut preview) = self.preview.take() {
            preview.release();
        }
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            session_id: self.session_id,
            generation: self.generation,
            step: self.step,
            progress: self.progress,
            file: self.file.as_ref().map(|f| FileSummary {
                name: f.name.clone(),
                mime_type: f.mime_type.clone(),
                size: f.size,
            }),
            preview_url: self.preview_url().map(str::to_string),
            error: self.error.clone(),
            result: self.result.clone(),
        }
    }

    fn transition_to(&mut self, new_step: UploadStep) -> Option<StepTransition> {
        let old_step = self.step;
        self.step = new_step;

        (old_step != new_step).then(|| StepTransition {
            session_id: self.session_id,
            generation: self.generation,
            old_step,
            new_step,
            transitioned_at: Utc::now(),
        })
    }
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if let Some(token) = self.active_run.take() {
            token.cancel();
        }
    }
}
