//! [`RemoteStore`] over an SFTP session.

use std::sync::Arc;

use async_trait::async_trait;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::protocol::{FileAttributes, StatusCode};

use burrow_core::remote::{
    EntryKind, RemoteConnector, RemoteEntry, RemoteError, RemoteMetadata, RemoteReader,
    RemoteStore, RemoteWriter,
};

use crate::client::{open_session, SftpConfig, SftpConnection};

/// Opens a fresh SFTP session per [`RemoteConnector::connect`] call.
#[derive(Debug, Clone)]
pub struct SftpConnector {
    config: SftpConfig,
}

impl SftpConnector {
    pub fn new(config: SftpConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RemoteConnector for SftpConnector {
    async fn connect(&self) -> Result<Arc<dyn RemoteStore>, RemoteError> {
        let connection = open_session(&self.config).await.map_err(|e| {
            tracing::warn!(host = %self.config.host, error = %e, "SFTP connect failed");
            RemoteError::Other(e.to_string())
        })?;
        Ok(Arc::new(SftpStore { connection }))
    }
}

pub struct SftpStore {
    connection: SftpConnection,
}

/// Classify an SFTP error: a `NoSuchFile` status is `NotFound`, everything
/// else is passed through with its message.
pub(crate) fn map_sftp_error(err: SftpError, path: &str) -> RemoteError {
    if let SftpError::Status(status) = &err {
        if status.status_code == StatusCode::NoSuchFile {
            return RemoteError::NotFound(path.to_string());
        }
    }
    let message = err.to_string();
    if message.contains("No such file") || message.contains("not found") {
        RemoteError::NotFound(path.to_string())
    } else {
        RemoteError::Other(format!("{path}: {message}"))
    }
}

fn metadata_from_attrs(attrs: &FileAttributes) -> RemoteMetadata {
    RemoteMetadata {
        kind: if attrs.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        },
        size: attrs.size.unwrap_or(0),
        modified: attrs.mtime.map(i64::from),
    }
}

#[async_trait]
impl RemoteStore for SftpStore {
    async fn stat(&self, path: &str) -> Result<RemoteMetadata, RemoteError> {
        let attrs = self
            .connection
            .sftp
            .metadata(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;
        Ok(metadata_from_attrs(&attrs))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let dir = self
            .connection
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;

        Ok(dir
            .filter_map(|entry| {
                let name = entry.file_name();
                if name == "." || name == ".." {
                    return None;
                }
                Some(RemoteEntry {
                    metadata: metadata_from_attrs(&entry.metadata()),
                    name,
                })
            })
            .collect())
    }

    async fn open_read(&self, path: &str) -> Result<RemoteReader, RemoteError> {
        let file = self
            .connection
            .sftp
            .open(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &str) -> Result<RemoteWriter, RemoteError> {
        let file = self
            .connection
            .sftp
            .create(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;
        Ok(Box::new(file))
    }

    async fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        self.connection
            .sftp
            .create_dir(path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }
}
