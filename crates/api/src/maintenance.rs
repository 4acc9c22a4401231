//! Maintenance flag and notice broadcast.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use burrow_events::bus::ProgressBus;

pub struct MaintenanceMode {
    active: AtomicBool,
    bus: Arc<ProgressBus>,
}

impl MaintenanceMode {
    pub fn new(bus: Arc<ProgressBus>) -> Self {
        Self {
            active: AtomicBool::new(false),
            bus,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Broadcast a maintenance notice to every observer without changing
    /// the flag. Returns the number of bus subscribers reached.
    pub fn announce(&self, reason: Option<&str>) -> usize {
        self.bus.publish_maintenance(reason)
    }

    /// Enter maintenance mode and announce it. Idempotent: only the first
    /// call broadcasts.
    pub fn begin(&self, reason: Option<&str>) -> bool {
        if self.active.swap(true, Ordering::SeqCst) {
            return false;
        }
        tracing::warn!("Entering maintenance mode");
        self.announce(reason);
        true
    }
}
