//! WebSocket message type constants for download progress events.
//!
//! Used by `burrow_events::bus::ProgressMessage` (serde tags) and by the API
//! forwarder when relaying bus traffic to connected clients.

use serde::{Deserialize, Serialize};

/// Byte-count progress of a running job.
pub const MSG_TYPE_PROGRESS: &str = "progress";

/// Job finished; the artifact can be collected.
pub const MSG_TYPE_COMPLETE: &str = "complete";

/// Job failed; no artifact exists.
pub const MSG_TYPE_ERROR: &str = "error";

/// Service-wide notice, not tied to any job.
pub const MSG_TYPE_MAINTENANCE: &str = "maintenance";

/// Reason sent with the maintenance notice on shutdown when none is given.
pub const DEFAULT_MAINTENANCE_REASON: &str = "Server shutting down for maintenance";

/// Which half of a download a progress value belongs to.
///
/// Directory downloads report `Retrieving` 0..=100 followed by
/// `Compressing` 0..=100. Single files only ever report `Retrieving`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferPhase {
    Retrieving,
    Compressing,
}

impl TransferPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferPhase::Retrieving => "retrieving",
            TransferPhase::Compressing => "compressing",
        }
    }
}

/// Integer percentage of `done` out of `total`, capped at 100.
///
/// An empty transfer (`total == 0`) is complete by definition.
pub fn progress_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) as u128 * 100) / total as u128) as u8
}
