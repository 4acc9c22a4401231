//! Bridges between the pipeline and connected clients.

pub mod progress;
