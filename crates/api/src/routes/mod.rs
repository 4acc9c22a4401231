pub mod downloads;
pub mod health;
pub mod maintenance;
pub mod preview;
pub mod sftp;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                  WebSocket (progress observers)
///
/// /sftp/list?path=                     list directory
/// /sftp/directories                    create directory (POST)
/// /sftp/upload                         multipart upload (POST)
///
/// /preview?path=                       thumbnail or raw file
///
/// /downloads                           request download (POST)
/// /downloads/{id}                      job status
/// /downloads/{id}/file                 fetch artifact (once)
///
/// /maintenance                         broadcast maintenance notice (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/sftp", sftp::router())
        .nest("/preview", preview::router())
        .nest("/downloads", downloads::router())
        .nest("/maintenance", maintenance::router())
}
