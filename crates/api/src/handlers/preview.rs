//! Thumbnail and raw-file preview handler.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use burrow_core::error::CoreError;
use burrow_core::media::content_type_for;
use burrow_core::paths;
use burrow_pipeline::{Preview, PreviewTarget};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    pub path: String,
}

// ---------------------------------------------------------------------------
// GET /preview
// ---------------------------------------------------------------------------

/// Serve the JPEG thumbnail for images, HEIC, video and PDF files, or the
/// raw bytes for anything else.
///
/// Conversion failures are answered with the placeholder image, which is
/// marked non-cacheable so a later request can pick up a real thumbnail.
pub async fn get_preview(
    State(state): State<AppState>,
    Query(params): Query<PreviewQuery>,
) -> AppResult<Response> {
    let remote_path = paths::normalize(&params.path);
    if paths::is_root(&remote_path) {
        return Err(AppError::BadRequest("A file path is required".into()));
    }

    let target = state
        .pipeline
        .thumbnails
        .preview(&remote_path)
        .await
        .map_err(CoreError::from)?;

    match target {
        PreviewTarget::Thumbnail(preview) => serve_thumbnail(&preview).await,
        PreviewTarget::Passthrough => stream_remote(&state, &remote_path).await,
    }
}

async fn serve_thumbnail(preview: &Preview) -> AppResult<Response> {
    let file = tokio::fs::File::open(preview.path())
        .await
        .map_err(|e| AppError::InternalError(format!("{}: {e}", preview.path().display())))?;
    let len = file
        .metadata()
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?
        .len();

    let cache_control = if preview.is_placeholder() {
        "no-store"
    } else {
        "public, max-age=86400"
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/jpeg")
        .header(header::CONTENT_LENGTH, len.to_string())
        .header(header::CACHE_CONTROL, cache_control)
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| AppError::InternalError(e.to_string()))
}

/// Stream a remote file unchanged. The session stays open until the body
/// has been sent.
async fn stream_remote(state: &AppState, remote_path: &str) -> AppResult<Response> {
    let store = state.pipeline.connector.connect().await?;
    let meta = store.stat(remote_path).await?;
    if meta.is_dir() {
        return Err(AppError::BadRequest(format!(
            "{remote_path} is a directory"
        )));
    }
    let reader = store.open_read(remote_path).await?;

    let stream = ReaderStream::new(reader).map(move |chunk| {
        let _session = &store;
        chunk
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(remote_path))
        .header(header::CONTENT_LENGTH, meta.size.to_string())
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::InternalError(e.to_string()))
}
