//! Analysis endpoint
//!
//! POST /api/analysis: multipart upload with a `file` field. Requires a
//! bearer token, applies the same type/size limits as the client, and returns
//! the fixture result.

use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use labtrack_common::LabEvent;
use uuid::Uuid;

use super::MockState;
use crate::error::{ApiError, ApiResult};
use crate::models::{AnalysisResult, SelectedFile};
use crate::workflow::UploadError;

/// Multipart field carrying the upload
pub const FILE_FIELD: &str = "file";

/// POST /api/analysis
pub async fn analyze(
    State(state): State<MockState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Json<AnalysisResult>> {
    let outcome = analyze_upload(&state, &headers, multipart).await;
    if let Err(e) = &outcome {
        tracing::warn!(error = %e, "Mock analysis rejected");
        state.record_error(e).await;
    }
    outcome.map(Json)
}

async fn analyze_upload(
    state: &MockState,
    headers: &HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<AnalysisResult> {
    state.authorize(headers)?;

    let file = read_file_field(&mut multipart).await?;

    state.limits.validate(&file).map_err(|e| match e {
        UploadError::Unsupported { .. } => ApiError::UnsupportedMediaType(e.to_string()),
        UploadError::TooLarge { .. } => ApiError::PayloadTooLarge(e.to_string()),
        UploadError::Empty => ApiError::BadRequest(e.to_string()),
    })?;

    tracing::info!(
        file = %file.name,
        mime_type = %file.mime_type,
        size = file.size,
        "Mock analysis accepted upload"
    );

    let result = AnalysisResult::fixture();
    state.event_bus.emit_lossy(LabEvent::AnalysisCompleted {
        session_id: Uuid::new_v4(),
        summary: result.summary.as_str().to_string(),
        timestamp: Utc::now(),
    });
    Ok(result)
}

async fn read_file_field(multipart: &mut Multipart) -> ApiResult<SelectedFile> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let contents = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;

        return Ok(SelectedFile::with_contents(name, mime_type, contents.to_vec()));
    }

    Err(ApiError::BadRequest(format!(
        "Missing multipart field '{}'",
        FILE_FIELD
    )))
}

/// Build analysis routes
pub fn analysis_routes() -> Router<MockState> {
    Router::new().route("/api/analysis", post(analyze))
}
