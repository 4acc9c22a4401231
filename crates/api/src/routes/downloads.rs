//! Route definitions for background downloads.
//!
//! Mounted at `/downloads` by `api_routes()`.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::downloads;
use crate::state::AppState;

/// ```text
/// POST   /                  -> create_download
/// GET    /{id}              -> get_download
/// GET    /{id}/file         -> download_file (one-shot)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(downloads::create_download))
        .route("/{id}", get(downloads::get_download))
        .route("/{id}/file", get(downloads::download_file))
}
