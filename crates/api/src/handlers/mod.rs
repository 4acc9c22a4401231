//! Request handlers.
//!
//! Each submodule provides the async handler functions for one route group.
//! Handlers delegate to the pipeline and map errors via [`AppError`].
//!
//! [`AppError`]: crate::error::AppError

pub mod downloads;
pub mod maintenance;
pub mod preview;
pub mod sftp;
