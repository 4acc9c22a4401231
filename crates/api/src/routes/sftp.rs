//! Route definitions for browsing the remote tree.
//!
//! Mounted at `/sftp` by `api_routes()`.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::sftp;
use crate::state::AppState;

/// ```text
/// GET    /list?path=          -> list_directory
/// POST   /directories         -> create_directory
/// POST   /upload              -> upload (multipart, no body limit)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/list", get(sftp::list_directory))
        .route("/directories", post(sftp::create_directory))
        .route(
            "/upload",
            post(sftp::upload).layer(DefaultBodyLimit::disable()),
        )
}
