//! Contract for the remote file store the service browses.
//!
//! The store is passive: every operation is a request over a session that the
//! caller owns. [`RemoteConnector::connect`] opens a fresh session; interactive
//! requests, download jobs and the eager thumbnail sweep each hold their own.
//!
//! Errors are classified into exactly two classes. [`RemoteError::NotFound`]
//! drives path recovery on listings; everything else is [`RemoteError::Other`]
//! and is surfaced to the caller unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

/// Readable byte stream of a remote file.
pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Writable byte stream of a remote file. Callers must `shutdown()` it to
/// flush and close the handle.
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("No such file: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }

    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(path: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            RemoteError::NotFound(path.to_string())
        } else {
            RemoteError::Other(format!("{path}: {err}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Kind of a remote directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// Result of a `stat` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMetadata {
    pub kind: EntryKind,
    pub size: u64,
    /// Modification time in seconds since the Unix epoch, when the server reports one.
    pub modified: Option<i64>,
}

impl RemoteMetadata {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// One child of a remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub metadata: RemoteMetadata,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Operations on one open session with the remote store.
///
/// Paths are absolute, `/`-separated and already normalised by the caller
/// (see [`crate::paths::normalize`]).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn stat(&self, path: &str) -> Result<RemoteMetadata, RemoteError>;

    /// List the children of a directory, excluding `.` and `..`.
    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError>;

    async fn open_read(&self, path: &str) -> Result<RemoteReader, RemoteError>;

    /// Create or truncate a file for writing.
    async fn open_write(&self, path: &str) -> Result<RemoteWriter, RemoteError>;

    async fn mkdir(&self, path: &str) -> Result<(), RemoteError>;
}

/// Factory for remote sessions.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn RemoteStore>, RemoteError>;
}
