use std::time::Duration;

use burrow_core::error::CoreError;
use burrow_core::remote::RemoteError;

/// Failure while moving bytes from the remote store to local disk.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("local I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no data from {path} for {timeout:?}")]
    Stalled { path: String, timeout: Duration },
}

/// Failure of a download job body. Reported on the bus and kept on the job.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("packaging exceeded {0:?}")]
    Timeout(Duration),

    #[error("job aborted: {0}")]
    Aborted(String),
}

impl From<RemoteError> for DownloadError {
    fn from(err: RemoteError) -> Self {
        DownloadError::Transfer(TransferError::Remote(err))
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        DownloadError::Transfer(TransferError::Io(err))
    }
}

/// Failure of a preview request. Cloned to every caller waiting on the same
/// cache key, hence the string payloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreviewError {
    #[error("No such file: {0}")]
    NotFound(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<RemoteError> for PreviewError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(path) => PreviewError::NotFound(path),
            RemoteError::Other(msg) => PreviewError::Remote(msg),
        }
    }
}

impl From<std::io::Error> for PreviewError {
    fn from(err: std::io::Error) -> Self {
        PreviewError::Io(err.to_string())
    }
}

impl From<TransferError> for PreviewError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Remote(e) => e.into(),
            other => PreviewError::Io(other.to_string()),
        }
    }
}

impl From<PreviewError> for CoreError {
    fn from(err: PreviewError) -> Self {
        match err {
            PreviewError::NotFound(path) => CoreError::NotFound {
                entity: "File",
                id: path,
            },
            PreviewError::Remote(msg) => CoreError::Remote(RemoteError::Other(msg)),
            PreviewError::Io(msg) => CoreError::Internal(msg),
        }
    }
}
