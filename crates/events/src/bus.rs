//! In-process progress bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`ProgressBus`] fans every [`ProgressMessage`] out to all current
//! subscribers. Delivery is best effort: there is no replay for late
//! subscribers, no retry, and a subscriber that falls behind the channel
//! capacity loses the oldest messages. Shared via `Arc<ProgressBus>`.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use burrow_core::job_events::{
    TransferPhase, DEFAULT_MAINTENANCE_REASON, MSG_TYPE_COMPLETE, MSG_TYPE_ERROR,
    MSG_TYPE_MAINTENANCE, MSG_TYPE_PROGRESS,
};
use burrow_core::types::JobId;

// ---------------------------------------------------------------------------
// ProgressMessage
// ---------------------------------------------------------------------------

/// A message relayed to every progress observer.
///
/// Serialised with a `type` tag and camelCase fields, e.g.
/// `{"type":"progress","jobId":"j1","phase":"retrieving","progress":42}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum ProgressMessage {
    Progress {
        job_id: JobId,
        phase: TransferPhase,
        progress: u8,
    },
    Complete {
        job_id: JobId,
    },
    Error {
        job_id: JobId,
        error: String,
    },
    Maintenance {
        reason: String,
    },
}

impl ProgressMessage {
    /// The job this message belongs to; `None` for maintenance notices.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            ProgressMessage::Progress { job_id, .. }
            | ProgressMessage::Complete { job_id }
            | ProgressMessage::Error { job_id, .. } => Some(job_id),
            ProgressMessage::Maintenance { .. } => None,
        }
    }

    /// Wire value of the `type` tag.
    pub fn message_type(&self) -> &'static str {
        match self {
            ProgressMessage::Progress { .. } => MSG_TYPE_PROGRESS,
            ProgressMessage::Complete { .. } => MSG_TYPE_COMPLETE,
            ProgressMessage::Error { .. } => MSG_TYPE_ERROR,
            ProgressMessage::Maintenance { .. } => MSG_TYPE_MAINTENANCE,
        }
    }

    pub fn to_json(&self) -> String {
        // Serialising a plain enum of strings and integers cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// ProgressBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out bus for job progress and maintenance notices.
///
/// ```rust
/// use burrow_events::bus::{ProgressBus, ProgressMessage};
///
/// let bus = ProgressBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(ProgressMessage::Complete { job_id: "j1".into() });
/// ```
#[derive(Clone)]
pub struct ProgressBus {
    sender: broadcast::Sender<ProgressMessage>,
}

impl ProgressBus {
    /// Create a bus with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Deliver a message to every current subscriber.
    ///
    /// Returns the number of subscribers reached. With no subscribers the
    /// message is dropped.
    pub fn publish(&self, message: ProgressMessage) -> usize {
        match self.sender.send(message) {
            Ok(count) => count,
            Err(_) => 0,
        }
    }

    /// Broadcast a service-wide maintenance notice (no job id).
    pub fn publish_maintenance(&self, reason: Option<&str>) -> usize {
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or(DEFAULT_MAINTENANCE_REASON);
        tracing::info!(reason, "Broadcasting maintenance notice");
        self.publish(ProgressMessage::Maintenance {
            reason: reason.to_string(),
        })
    }

    /// Observe every message published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(job: &str, value: u8) -> ProgressMessage {
        ProgressMessage::Progress {
            job_id: job.to_string(),
            phase: TransferPhase::Retrieving,
            progress: value,
        }
    }

    #[tokio::test]
    async fn every_subscriber_receives_each_message() {
        let bus = ProgressBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.publish(progress("j1", 10)), 2);

        assert_eq!(rx1.recv().await.unwrap(), progress("j1", 10));
        assert_eq!(rx2.recv().await.unwrap(), progress("j1", 10));
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_replay() {
        let bus = ProgressBus::default();
        bus.publish(progress("j1", 50));

        let mut rx = bus.subscribe();
        bus.publish(ProgressMessage::Complete {
            job_id: "j1".into(),
        });

        let first = rx.recv().await.unwrap();
        assert_eq!(first.message_type(), MSG_TYPE_COMPLETE);
    }

    #[test]
    fn publish_with_no_subscribers_is_dropped() {
        let bus = ProgressBus::default();
        assert_eq!(bus.publish(progress("orphan", 1)), 0);
    }

    #[tokio::test]
    async fn maintenance_uses_default_reason_and_has_no_job() {
        let bus = ProgressBus::default();
        let mut rx = bus.subscribe();

        bus.publish_maintenance(None);
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.job_id(), None);
        assert_eq!(
            msg,
            ProgressMessage::Maintenance {
                reason: DEFAULT_MAINTENANCE_REASON.to_string()
            }
        );
    }

    #[test]
    fn wire_format_uses_type_tag_and_camel_case() {
        let json: serde_json::Value =
            serde_json::from_str(&progress("abc", 42).to_json()).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["jobId"], "abc");
        assert_eq!(json["phase"], "retrieving");
        assert_eq!(json["progress"], 42);

        let json: serde_json::Value = serde_json::from_str(
            &ProgressMessage::Maintenance {
                reason: "restart".into(),
            }
            .to_json(),
        )
        .unwrap();
        assert_eq!(json, serde_json::json!({"type": "maintenance", "reason": "restart"}));
    }

    #[tokio::test]
    async fn slow_subscriber_lags_instead_of_blocking() {
        let bus = ProgressBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(progress("j", i));
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
