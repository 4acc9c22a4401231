//! Handlers for browsing and modifying the remote tree.

use std::io;

use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::TryStreamExt;
use serde::Deserialize;
use tokio_util::io::StreamReader;

use burrow_core::paths;
use burrow_pipeline::browse::{self, Listing, UploadedFile};

use crate::error::{AppError, AppResult};
use crate::response::{DataResponse, DirectoryGoneResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDirectoryRequest {
    pub path: String,
    pub directory_name: String,
}

// ---------------------------------------------------------------------------
// GET /sftp/list
// ---------------------------------------------------------------------------

/// List a remote directory, newest first.
///
/// A directory that has disappeared answers 404 with the closest existing
/// ancestor in `fallbackPath`.
pub async fn list_directory(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> AppResult<Response> {
    let path = params.path.unwrap_or_else(|| "/".into());
    let store = state.pipeline.connector.connect().await?;

    match browse::list_directory(store.as_ref(), &path).await? {
        Listing::Entries { path, entries } => {
            tracing::debug!(path = %path, count = entries.len(), "Directory listed");
            Ok(Json(DataResponse { data: entries }).into_response())
        }
        Listing::Deleted {
            deleted_path,
            fallback_path,
        } => Ok((
            StatusCode::NOT_FOUND,
            Json(DirectoryGoneResponse {
                message: "Directory no longer exists",
                deleted_path,
                fallback_path,
            }),
        )
            .into_response()),
    }
}

// ---------------------------------------------------------------------------
// POST /sftp/directories
// ---------------------------------------------------------------------------

#[derive(Debug, serde::Serialize)]
pub struct CreatedDirectory {
    pub path: String,
}

pub async fn create_directory(
    State(state): State<AppState>,
    Json(input): Json<CreateDirectoryRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<CreatedDirectory>>)> {
    let store = state.pipeline.connector.connect().await?;
    let path = browse::create_directory(store.as_ref(), &input.path, &input.directory_name).await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: CreatedDirectory { path },
        }),
    ))
}

// ---------------------------------------------------------------------------
// POST /sftp/upload
// ---------------------------------------------------------------------------

/// Upload one or more files (multipart).
///
/// The `path` field names the destination directory and must precede the
/// `files` parts. A file name may carry a relative path for folder uploads.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<Vec<UploadedFile>>>)> {
    let store = state.pipeline.connector.connect().await?;
    let mut destination: Option<String> = None;
    let mut uploaded = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("path") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?;
                destination = Some(paths::normalize(&value));
            }
            Some("files") => {
                let dest = destination.clone().ok_or_else(|| {
                    AppError::BadRequest("The 'path' field must precede the files".into())
                })?;
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .ok_or_else(|| AppError::BadRequest("File part without a file name".into()))?;

                let reader = StreamReader::new(Box::pin(field.map_err(io::Error::other)));
                let file = browse::upload_file(store.as_ref(), &dest, &file_name, reader).await?;
                uploaded.push(file);
            }
            _ => {}
        }
    }

    if uploaded.is_empty() {
        return Err(AppError::BadRequest(
            "No files received in multipart upload".to_string(),
        ));
    }

    tracing::info!(count = uploaded.len(), "Upload finished");
    Ok((StatusCode::CREATED, Json(DataResponse { data: uploaded })))
}
