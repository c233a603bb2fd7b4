//! Upload/analysis workflow tests
//!
//! Time is paused so simulated progress runs instantly and deterministically.

mod helpers;

use async_trait::async_trait;
use helpers::{auth_session, signed_in, signed_out, MB};
use labtrack_client::api::{AnalysisCollaborator, FixtureAnalyzer};
use labtrack_client::error::{ClientError, ClientResult};
use labtrack_client::models::{AnalysisResult, SelectedFile};
use labtrack_client::workflow::{
    AnalyzeOutcome, ObjectUrlRegistry, UploadError, UploadStep, Workflow, WorkflowError,
};
use labtrack_common::config::GuardConfig;
use labtrack_common::events::LabEvent;
use labtrack_common::storage::LAST_ANALYSIS_KEY;
use labtrack_common::Credentials;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

struct FailingAnalyzer(fn() -> ClientError);

#[async_trait]
impl AnalysisCollaborator for FailingAnalyzer {
    async fn analyze(&self, _file: &SelectedFile) -> ClientResult<AnalysisResult> {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Err((self.0)())
    }
}

fn workflow_with(
    credentials: Credentials,
    analyzer: Arc<dyn AnalysisCollaborator>,
) -> (Workflow, Arc<ObjectUrlRegistry>) {
    let registry = Arc::new(ObjectUrlRegistry::new());
    let workflow = Workflow::builder(auth_session(credentials), analyzer)
        .previews(registry.clone())
        .build();
    (workflow, registry)
}

fn slow_fixture() -> Arc<dyn AnalysisCollaborator> {
    Arc::new(FixtureAnalyzer::new().with_delay(Duration::from_millis(500)))
}

fn pdf(name: &str) -> SelectedFile {
    SelectedFile::new(name, "application/pdf", 2 * MB)
}

fn png(name: &str) -> SelectedFile {
    SelectedFile::new(name, "image/png", MB)
}

fn jpeg(name: &str) -> SelectedFile {
    SelectedFile::new(name, "image/jpeg", MB)
}

fn progress_events(rx: &mut Receiver<LabEvent>) -> Vec<u8> {
    let mut progress = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let LabEvent::UploadProgress { progress: p, .. } = event {
            progress.push(p);
        }
    }
    progress
}

#[tokio::test(start_paused = true)]
async fn test_pdf_scenario_runs_to_results() {
    let credentials = signed_in();
    let mut rx = credentials.bus().subscribe();
    let (workflow, registry) = workflow_with(credentials, slow_fixture());

    workflow.select_file(pdf("result.pdf")).await.unwrap();
    assert_eq!(registry.created_count(), 0, "PDFs get no preview");

    let outcome = workflow.start_analysis().await.unwrap();
    let AnalyzeOutcome::Completed(result) = outcome else {
        panic!("expected completion, got {:?}", outcome);
    };
    assert_eq!(result, AnalysisResult::fixture());

    let expected: Vec<u8> = (0..=100u8).step_by(5).collect();
    assert_eq!(progress_events(&mut rx), expected);

    let snapshot = workflow.snapshot().await;
    assert_eq!(snapshot.step, UploadStep::Results);
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.result, Some(AnalysisResult::fixture()));
    assert!(snapshot.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_oversize_png_is_rejected_without_preview() {
    let (workflow, registry) = workflow_with(signed_in(), slow_fixture());

    let err = workflow
        .select_file(SelectedFile::new("photo.png", "image/png", 12 * MB))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        UploadError::TooLarge {
            max_mb: 10,
            size: 12 * MB
        }
    );
    assert_eq!(registry.created_count(), 0);

    let snapshot = workflow.snapshot().await;
    assert_eq!(snapshot.step, UploadStep::Upload);
    assert!(snapshot.file.is_none());
    assert_eq!(snapshot.error.as_deref(), Some("errors.tooLarge"));
}

#[tokio::test(start_paused = true)]
async fn test_rejection_leaves_previous_selection_alone() {
    let (workflow, registry) = workflow_with(signed_in(), slow_fixture());
    workflow.select_file(png("first.png")).await.unwrap();
    let before = workflow.snapshot().await;

    for bad in [
        SelectedFile::new("notes.txt", "text/plain", 10),
        SelectedFile::new("anim.gif", "image/gif", 10),
    ] {
        let err = workflow.select_file(bad).await.unwrap_err();
        assert_eq!(err.message_key(), "errors.unsupported");
    }

    let after = workflow.snapshot().await;
    assert_eq!(after.file, before.file);
    assert_eq!(after.preview_url, before.preview_url);
    assert_eq!(after.step, UploadStep::Upload);
    assert_eq!(registry.created_count(), 1);
    assert_eq!(registry.live_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unauthenticated_start_stays_in_upload() {
    let (workflow, _registry) = workflow_with(signed_out(), slow_fixture());
    workflow.select_file(pdf("result.pdf")).await.unwrap();

    let outcome = workflow.start_analysis().await.unwrap();
    assert_eq!(
        outcome,
        AnalyzeOutcome::AuthRequired {
            location: "/signin?returnTo=%2Fupload".to_string()
        }
    );

    let snapshot = workflow.snapshot().await;
    assert_eq!(snapshot.step, UploadStep::Upload);
    assert_eq!(snapshot.progress, 0);
    assert!(snapshot.file.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_sign_in_required_even_when_upload_is_not_a_guarded_prefix() {
    let workflow = Workflow::builder(auth_session(signed_out()), slow_fixture())
        .guard(GuardConfig {
            protected_prefixes: vec!["/admin".to_string()],
            sign_in_path: "/signin".to_string(),
        })
        .build();
    workflow.select_file(pdf("result.pdf")).await.unwrap();

    let outcome = workflow.start_analysis().await.unwrap();
    assert_eq!(
        outcome,
        AnalyzeOutcome::AuthRequired {
            location: "/signin?returnTo=%2Fupload".to_string()
        }
    );

    let snapshot = workflow.snapshot().await;
    assert_eq!(snapshot.step, UploadStep::Upload);
    assert!(snapshot.result.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_image_types_get_previews() {
    let (workflow, registry) = workflow_with(signed_in(), slow_fixture());

    workflow.select_file(jpeg("scan.jpg")).await.unwrap();
    assert_eq!(registry.created_count(), 1);
    assert!(workflow.snapshot().await.preview_url.is_some());

    workflow.select_file(png("scan.png")).await.unwrap();
    assert_eq!(registry.created_count(), 2);

    // MIME types are matched case-insensitively
    workflow
        .select_file(SelectedFile::new("photo.png", "IMAGE/PNG", MB))
        .await
        .unwrap();
    assert_eq!(registry.created_count(), 3);
    assert_eq!(registry.live_count(), 1);

    workflow.select_file(pdf("result.pdf")).await.unwrap();
    assert_eq!(registry.created_count(), 3);
    assert_eq!(registry.live_count(), 0);
    assert!(workflow.snapshot().await.preview_url.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_zero_byte_file_is_rejected() {
    let (workflow, registry) = workflow_with(signed_in(), slow_fixture());

    let err = workflow
        .select_file(SelectedFile::new("empty.pdf", "application/pdf", 0))
        .await
        .unwrap_err();
    assert_eq!(err, UploadError::Empty);

    let snapshot = workflow.snapshot().await;
    assert!(snapshot.file.is_none());
    assert_eq!(snapshot.error.as_deref(), Some("errors.noFile"));
    assert_eq!(registry.created_count(), 0);
    assert_eq!(workflow.start_analysis().await, Err(WorkflowError::NoFile));
}

#[tokio::test(start_paused = true)]
async fn test_start_requires_file_and_upload_step() {
    let (workflow, _registry) = workflow_with(signed_in(), slow_fixture());
    assert_eq!(workflow.start_analysis().await, Err(WorkflowError::NoFile));

    workflow.select_file(pdf("result.pdf")).await.unwrap();
    workflow.start_analysis().await.unwrap();
    assert_eq!(
        workflow.start_analysis().await,
        Err(WorkflowError::NotInUpload(UploadStep::Results))
    );
}

#[tokio::test(start_paused = true)]
async fn test_new_file_during_processing_discards_stale_result() {
    let (workflow, registry) = workflow_with(signed_in(), slow_fixture());
    workflow.select_file(png("first.png")).await.unwrap();

    let runner = workflow.clone();
    let run = tokio::spawn(async move { runner.start_analysis().await });

    let mut snapshots = workflow.watch();
    snapshots
        .wait_for(|s| s.step == UploadStep::Processing && s.progress >= 20)
        .await
        .unwrap();

    workflow.select_file(png("second.png")).await.unwrap();
    assert_eq!(run.await.unwrap().unwrap(), AnalyzeOutcome::Superseded);

    // Let any leftover timers fire; nothing may leak into the new session
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snapshot = workflow.snapshot().await;
    assert_eq!(snapshot.step, UploadStep::Upload);
    assert_eq!(snapshot.progress, 0);
    assert!(snapshot.result.is_none());
    assert_eq!(snapshot.file.unwrap().name, "second.png");
    assert_eq!(registry.created_count(), 2);
    assert_eq!(registry.revoked_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_reset_during_processing_supersedes_run() {
    let (workflow, registry) = workflow_with(signed_in(), slow_fixture());
    workflow.select_file(png("photo.png")).await.unwrap();

    let runner = workflow.clone();
    let run = tokio::spawn(async move { runner.start_analysis().await });
    workflow
        .watch()
        .wait_for(|s| s.step == UploadStep::Processing)
        .await
        .unwrap();

    workflow.reset().await;
    assert_eq!(run.await.unwrap().unwrap(), AnalyzeOutcome::Superseded);

    let snapshot = workflow.snapshot().await;
    assert!(snapshot.file.is_none());
    assert!(snapshot.result.is_none());
    assert_eq!(registry.live_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_progress_never_decreases() {
    let (workflow, _registry) = workflow_with(signed_in(), slow_fixture());
    workflow.select_file(pdf("result.pdf")).await.unwrap();

    let mut snapshots = workflow.watch();
    let observer = tokio::spawn(async move {
        let mut seen = Vec::new();
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            seen.push(snapshot.progress);
            if snapshot.step == UploadStep::Results {
                break;
            }
        }
        seen
    });

    workflow.start_analysis().await.unwrap();
    let seen = observer.await.unwrap();

    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{:?}", seen);
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test(start_paused = true)]
async fn test_preview_lifecycle() {
    let (workflow, registry) = workflow_with(signed_in(), slow_fixture());

    workflow.select_file(png("a.png")).await.unwrap();
    workflow.select_file(png("b.png")).await.unwrap();
    assert_eq!(registry.live_count(), 1);
    assert_eq!(registry.revoked_count(), 1);

    // Entering Results releases the preview
    workflow.start_analysis().await.unwrap();
    assert_eq!(registry.live_count(), 0);
    assert!(workflow.snapshot().await.preview_url.is_none());

    // Nothing left to release
    workflow.reset().await;
    workflow.reset().await;
    assert_eq!(registry.created_count(), 2);
    assert_eq!(registry.revoked_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_analysis_failure_returns_to_upload() {
    let analyzer = Arc::new(FailingAnalyzer(|| ClientError::Status {
        status: 503,
        message: "analysis backend down".to_string(),
    }));
    let credentials = signed_in();
    let mut rx = credentials.bus().subscribe();
    let (workflow, registry) = workflow_with(credentials, analyzer);
    workflow.select_file(png("photo.png")).await.unwrap();

    let outcome = workflow.start_analysis().await.unwrap();
    assert_eq!(
        outcome,
        AnalyzeOutcome::Failed {
            message: "HTTP 503: analysis backend down".to_string()
        }
    );

    let snapshot = workflow.snapshot().await;
    assert_eq!(snapshot.step, UploadStep::Upload);
    assert_eq!(snapshot.error.as_deref(), Some("HTTP 503: analysis backend down"));
    assert!(snapshot.file.is_some(), "file kept for retry");
    assert_eq!(registry.live_count(), 1, "preview kept for retry");

    let mut failed = false;
    while let Ok(event) = rx.try_recv() {
        failed |= matches!(event, LabEvent::AnalysisFailed { .. });
    }
    assert!(failed);

    // A retry is allowed from Upload
    assert!(matches!(
        workflow.start_analysis().await,
        Ok(AnalyzeOutcome::Failed { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_token_during_analysis_asks_for_sign_in() {
    let analyzer = Arc::new(FailingAnalyzer(|| ClientError::Unauthorized));
    let (workflow, _registry) = workflow_with(signed_in(), analyzer);
    workflow.select_file(pdf("result.pdf")).await.unwrap();

    let outcome = workflow.start_analysis().await.unwrap();
    assert_eq!(
        outcome,
        AnalyzeOutcome::AuthRequired {
            location: "/signin?returnTo=%2Fupload".to_string()
        }
    );
    assert_eq!(workflow.snapshot().await.step, UploadStep::Upload);
}

#[tokio::test(start_paused = true)]
async fn test_completed_result_is_persisted() {
    let credentials = signed_in();
    let store = credentials.store().clone();
    let (workflow, _registry) = workflow_with(credentials, slow_fixture());

    workflow.select_file(pdf("result.pdf")).await.unwrap();
    workflow.start_analysis().await.unwrap();

    let saved = store.get(LAST_ANALYSIS_KEY).expect("last analysis saved");
    let saved: AnalysisResult = serde_json::from_str(&saved).unwrap();
    assert_eq!(saved, AnalysisResult::fixture());
}

#[tokio::test(start_paused = true)]
async fn test_drop_uses_first_file_and_same_rules() {
    let (workflow, registry) = workflow_with(signed_in(), slow_fixture());

    assert_eq!(workflow.drop_files(Vec::new()).await, Err(UploadError::Empty));
    assert_eq!(
        workflow.snapshot().await.error.as_deref(),
        Some("errors.noFile")
    );

    let err = workflow
        .drop_files(vec![SelectedFile::new("scan.tiff", "image/tiff", 10)])
        .await
        .unwrap_err();
    assert_eq!(err.message_key(), "errors.unsupported");

    workflow
        .drop_files(vec![png("first.png"), pdf("second.pdf")])
        .await
        .unwrap();
    let snapshot = workflow.snapshot().await;
    assert_eq!(snapshot.file.unwrap().name, "first.png");
    assert!(snapshot.error.is_none());
    assert_eq!(registry.created_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_back_resets_then_navigates() {
    let (workflow, registry) = workflow_with(signed_in(), slow_fixture());
    workflow.select_file(png("photo.png")).await.unwrap();
    workflow.start_analysis().await.unwrap();

    let navigated = Arc::new(AtomicBool::new(false));
    let flag = navigated.clone();
    workflow
        .back(move || flag.store(true, Ordering::SeqCst))
        .await;

    assert!(navigated.load(Ordering::SeqCst));
    let snapshot = workflow.snapshot().await;
    assert_eq!(snapshot.step, UploadStep::Upload);
    assert!(snapshot.result.is_none());
    assert_eq!(registry.live_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unmount_cancels_processing_and_releases_preview() {
    let (workflow, registry) = workflow_with(signed_in(), slow_fixture());
    workflow.select_file(png("photo.png")).await.unwrap();

    let runner = workflow.clone();
    let run = tokio::spawn(async move { runner.start_analysis().await });
    workflow
        .watch()
        .wait_for(|s| s.step == UploadStep::Processing)
        .await
        .unwrap();

    workflow.unmount().await;
    assert_eq!(run.await.unwrap().unwrap(), AnalyzeOutcome::Superseded);
    assert_eq!(registry.live_count(), 0);

    let snapshot = workflow.snapshot().await;
    assert_eq!(snapshot.step, UploadStep::Upload);
    assert_eq!(snapshot.progress, 0);
    assert!(snapshot.file.is_none());
    assert!(snapshot.result.is_none());

    // Nothing is left stuck in Processing
    workflow.select_file(pdf("result.pdf")).await.unwrap();
    assert!(matches!(
        workflow.start_analysis().await.unwrap(),
        AnalyzeOutcome::Completed(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_step_events_follow_transitions() {
    let credentials = signed_in();
    let mut rx = credentials.bus().subscribe();
    let (workflow, _registry) = workflow_with(credentials, slow_fixture());

    workflow.select_file(pdf("result.pdf")).await.unwrap();
    workflow.start_analysis().await.unwrap();
    workflow.reset().await;

    let mut steps = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let LabEvent::UploadStepChanged {
            old_step, new_step, ..
        } = event
        {
            steps.push((old_step, new_step));
        }
    }

    assert_eq!(
        steps,
        vec![
            (UploadStep::Upload, UploadStep::Processing),
            (UploadStep::Processing, UploadStep::Results),
            (UploadStep::Results, UploadStep::Upload),
        ]
    );
}
