//! Handlers for background download jobs.
//!
//! A client posts a path, watches progress on the WebSocket, then fetches
//! the artifact exactly once.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use futures::StreamExt;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use burrow_core::error::CoreError;
use burrow_pipeline::JobSnapshot;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDownloadRequest {
    pub path: String,
    /// Client-chosen job id; repeating it returns the existing job.
    pub request_id: Option<String>,
}

// ---------------------------------------------------------------------------
// POST /downloads
// ---------------------------------------------------------------------------

pub async fn create_download(
    State(state): State<AppState>,
    Json(input): Json<CreateDownloadRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<JobSnapshot>>)> {
    if state.maintenance.is_active() {
        return Err(AppError::Core(CoreError::Conflict(
            "Server is entering maintenance; downloads are paused".into(),
        )));
    }

    let job = state
        .pipeline
        .downloads
        .request_job(input.request_id, &input.path)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: job })))
}

// ---------------------------------------------------------------------------
// GET /downloads/{id}
// ---------------------------------------------------------------------------

pub async fn get_download(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<JobSnapshot>>> {
    let job = state
        .pipeline
        .downloads
        .status(&job_id)
        .await
        .ok_or(CoreError::NotFound {
            entity: "Download",
            id: job_id,
        })?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// GET /downloads/{id}/file
// ---------------------------------------------------------------------------

/// Stream the finished artifact as an attachment. The job is consumed: a
/// second request answers 404 and the files are removed once the body has
/// been sent.
pub async fn download_file(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Response> {
    let artifact = state.pipeline.downloads.collect(&job_id).await?;
    let cleanup = artifact.cleanup;

    let stream = ReaderStream::new(artifact.file).map(move |chunk| {
        let _cleanup = &cleanup;
        chunk
    });

    let content_type = if artifact.file_name.ends_with(".zip") {
        "application/zip"
    } else {
        "application/octet-stream"
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, artifact.len.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(&artifact.file_name),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::InternalError(e.to_string()))
}

/// `attachment` header value; quotes and non-ASCII characters are replaced.
fn content_disposition(file_name: &str) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("attachment; filename=\"{safe}\"")
}
