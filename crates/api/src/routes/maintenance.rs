//! Route definitions for maintenance notices.
//!
//! Mounted at `/maintenance` by `api_routes()`.

use axum::routing::post;
use axum::Router;

use crate::handlers::maintenance;
use crate::state::AppState;

/// ```text
/// POST   /                  -> publish_maintenance
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", post(maintenance::publish_maintenance))
}
