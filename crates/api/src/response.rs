//! Shared response envelope types for API handlers.
//!
//! Successful JSON responses use a `{ "data": ... }` envelope.

use serde::Serialize;

/// Standard `{ "data": T }` response envelope.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}

/// Body of the 404 returned when a listed directory has been deleted.
///
/// Sent without the envelope so clients can read `fallbackPath` directly.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryGoneResponse {
    pub message: &'static str,
    pub deleted_path: String,
    pub fallback_path: String,
}
