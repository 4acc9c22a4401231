//! Domain types and leaf utilities shared by every burrow crate.
//!
//! Nothing in here knows about HTTP, WebSockets or the worker pool. The
//! remote store contract, path handling, tool invocation and the progress
//! wire vocabulary live here so the pipeline and API crates agree on them.

pub mod error;
pub mod ffmpeg;
pub mod job_events;
pub mod local_store;
pub mod media;
pub mod path_recovery;
pub mod paths;
pub mod remote;
pub mod subprocess;
pub mod types;
