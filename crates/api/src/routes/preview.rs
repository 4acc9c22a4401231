//! Route definitions for thumbnails.
//!
//! Mounted at `/preview` by `api_routes()`.

use axum::routing::get;
use axum::Router;

use crate::handlers::preview;
use crate::state::AppState;

/// ```text
/// GET    /?path=              -> get_preview
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(preview::get_preview))
}
