use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct MaintenanceRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MaintenanceResponse {
    /// Bus subscribers the notice reached.
    pub receivers: usize,
}

// ---------------------------------------------------------------------------
// POST /maintenance
// ---------------------------------------------------------------------------

/// Broadcast a maintenance notice to every connected observer.
pub async fn publish_maintenance(
    State(state): State<AppState>,
    body: Option<Json<MaintenanceRequest>>,
) -> Json<DataResponse<MaintenanceResponse>> {
    let input = body.map(|Json(b)| b).unwrap_or_default();
    let receivers = state.maintenance.announce(input.reason.as_deref());
    Json(DataResponse {
        data: MaintenanceResponse { receivers },
    })
}
