//! Relay of bus messages to WebSocket observers.
//!
//! Every [`ProgressMessage`] is serialised once and broadcast to all
//! connections. A relay that falls behind the bus skips the lost messages
//! and keeps going.

use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;

use burrow_events::bus::ProgressMessage;

use crate::ws::WsManager;

/// Forward bus messages until the bus is closed.
pub async fn run(mut rx: Receiver<ProgressMessage>, ws_manager: Arc<WsManager>) {
    tracing::info!("Progress relay started");

    loop {
        match rx.recv().await {
            Ok(message) => relay(&ws_manager, &message).await,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Progress relay lagged, messages dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }

    tracing::info!("Progress relay stopped");
}

async fn relay(ws_manager: &WsManager, message: &ProgressMessage) {
    let delivered = ws_manager
        .broadcast(Message::Text(message.to_json().into()))
        .await;
    tracing::trace!(
        kind = message.message_type(),
        job_id = message.job_id().unwrap_or_default(),
        delivered,
        "Relayed progress message"
    );
}
