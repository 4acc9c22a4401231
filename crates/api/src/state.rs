use std::sync::Arc;

use burrow_pipeline::Pipeline;

use crate::config::ServerConfig;
use crate::maintenance::MaintenanceMode;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (progress observers).
    pub ws_manager: Arc<WsManager>,
    /// Remote connector, worker pool, thumbnail cache, download jobs and bus.
    pub pipeline: Pipeline,
    pub maintenance: Arc<MaintenanceMode>,
}
