//! Upload Routes
//!
//! Thin HTTP adapter over the upload pipeline.
//!
//! Endpoints:
//! - POST /api/v1/upload/pdf - Upload one file, returns its stored name
//! - POST /api/v1/upload/pdfs - Upload several files, returns per-file results
//!
//! Both take `multipart/form-data`; every part carrying a filename is treated
//! as an upload. Parts are streamed straight into the validator.

use std::io;

use axum::{
    extract::{multipart::Field, DefaultBodyLimit, Multipart, State},
    middleware,
    routing::post,
    Json, Router,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use crate::auth::require_bearer;
use crate::error::AppError;
use crate::state::AppState;
use crate::upload::{
    BatchReport, SingleUploadResponse, UploadDescriptor, UploadError, UploadOutcome,
    FALLBACK_MEDIA_TYPE,
};

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router(state: AppState) -> Router<AppState> {
    let body_limit = state.config().upload.request_body_limit();

    Router::new()
        .route("/pdf", post(upload_single))
        .route("/pdfs", post(upload_batch))
        .layer(middleware::from_fn_with_state(state, require_bearer))
        .layer(DefaultBodyLimit::max(body_limit))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/upload/pdf
///
/// Stores the first file part. Rejections map to their HTTP status.
async fn upload_single(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SingleUploadResponse>, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.file_name().is_none() {
            continue;
        }

        return match state.pipeline().process_one(descriptor_from_field(field)).await {
            UploadOutcome::Accepted {
                original_name,
                artifact,
            } => {
                let message = format!(
                    "File '{}' uploaded successfully as '{}'",
                    original_name, artifact.stored_filename
                );
                Ok(Json(SingleUploadResponse {
                    stored_filename: artifact.stored_filename,
                    message,
                }))
            }
            UploadOutcome::Rejected { reason, .. } => Err(reason.into()),
        };
    }

    tracing::warn!("No file field found in multipart upload");
    Err(AppError::BadRequest("No file provided".to_string()))
}

/// POST /api/v1/upload/pdfs
///
/// Every file part gets an outcome; failures never abort the request.
async fn upload_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<BatchReport>, AppError> {
    let max_files = state.config().upload.max_batch_files;
    let mut outcomes = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if outcomes.is_empty() => return Err(e.into()),
            Err(e) => {
                // Body is unreadable past this point; report what we have
                tracing::warn!(error = %e, processed = outcomes.len(), "Multipart stream ended early");
                break;
            }
        };

        if field.file_name().is_none() {
            continue;
        }
        // Over the limit: reject without reading, earlier items stand
        if outcomes.len() >= max_files {
            outcomes.push(UploadOutcome::Rejected {
                original_name: field.file_name().unwrap_or("unknown").to_string(),
                reason: UploadError::BatchLimit { limit: max_files },
            });
            continue;
        }

        outcomes.push(state.pipeline().process_one(descriptor_from_field(field)).await);
    }

    if outcomes.is_empty() {
        return Err(AppError::BadRequest("No files uploaded.".to_string()));
    }

    let report = BatchReport::from_outcomes(&outcomes);
    tracing::info!(
        uploaded = report.uploaded.len(),
        failed = report.failed.len(),
        status = ?report.status,
        "Batch upload complete"
    );

    Ok(Json(report))
}

// ============================================================================
// Helpers
// ============================================================================

fn descriptor_from_field(field: Field<'_>) -> UploadDescriptor<'_> {
    let declared_name = field.file_name().unwrap_or("unknown").to_string();
    let declared_media_type = field
        .content_type()
        .unwrap_or(FALLBACK_MEDIA_TYPE)
        .to_string();
    let reader = StreamReader::new(field.map_err(|e| io::Error::other(e.to_string())));

    UploadDescriptor::new(declared_name, declared_media_type, reader)
}
