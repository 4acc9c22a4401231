//! Per-phase progress reporting for download jobs.

use burrow_core::job_events::{progress_percent, TransferPhase};
use burrow_events::bus::{ProgressBus, ProgressMessage};

/// Tracks bytes moved in one phase of a job and publishes a progress message
/// every time the integer percentage increases.
///
/// Values published by one tracker are non-decreasing and start at 0. Being
/// `Send`, it can be moved into a blocking thread for the packaging phase.
pub struct PhaseProgress {
    bus: ProgressBus,
    job_id: String,
    phase: TransferPhase,
    total: u64,
    done: u64,
    last: Option<u8>,
}

impl PhaseProgress {
    /// Begin a phase and publish its 0 mark.
    pub fn start(bus: &ProgressBus, job_id: &str, phase: TransferPhase, total: u64) -> Self {
        let mut progress = Self {
            bus: bus.clone(),
            job_id: job_id.to_string(),
            phase,
            total,
            done: 0,
            last: None,
        };
        progress.emit(0);
        progress
    }

    pub fn advance(&mut self, bytes: u64) {
        self.done = self.done.saturating_add(bytes);
        let pct = progress_percent(self.done, self.total);
        match self.last {
            Some(last) if pct <= last => {}
            _ => self.emit(pct),
        }
    }

    /// Publish the 100 mark if it has not been reached yet.
    pub fn finish(&mut self) {
        if self.last != Some(100) {
            self.emit(100);
        }
    }

    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    fn emit(&mut self, pct: u8) {
        self.last = Some(pct);
        self.bus.publish(ProgressMessage::Progress {
            job_id: self.job_id.clone(),
            phase: self.phase,
            progress: pct,
        });
    }
}
