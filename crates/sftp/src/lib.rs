//! SFTP adapter for the remote store contract, built on `russh` and
//! `russh-sftp`. Every connect opens its own SSH connection.

pub mod client;
pub mod store;

pub use client::{SftpConfig, SshError};
pub use store::{SftpConnector, SftpStore};
