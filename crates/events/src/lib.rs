//! Progress broadcast bus for download jobs and service notices.

pub mod bus;

pub use bus::{ProgressBus, ProgressMessage};
