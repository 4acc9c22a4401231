//! Remote store backed by a directory on the local filesystem.
//!
//! Remote path `/a/b` maps to `{root}/a/b`. Used for development without an
//! SFTP server and as the store behind the test suites.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

use crate::paths;
use crate::remote::{
    EntryKind, RemoteConnector, RemoteEntry, RemoteError, RemoteMetadata, RemoteReader,
    RemoteStore, RemoteWriter,
};

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a remote path into the root. Normalisation strips `..` so the
    /// result can never escape the root directory.
    fn resolve(&self, path: &str) -> PathBuf {
        let normalized = paths::normalize(path);
        self.root.join(normalized.trim_start_matches('/'))
    }
}

fn metadata_from_fs(meta: &std::fs::Metadata) -> RemoteMetadata {
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64);

    RemoteMetadata {
        kind: if meta.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        },
        size: meta.len(),
        modified,
    }
}

#[async_trait]
impl RemoteStore for LocalStore {
    async fn stat(&self, path: &str) -> Result<RemoteMetadata, RemoteError> {
        let meta = tokio::fs::metadata(self.resolve(path))
            .await
            .map_err(|e| RemoteError::from_io(path, e))?;
        Ok(metadata_from_fs(&meta))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
        let mut dir = tokio::fs::read_dir(self.resolve(path))
            .await
            .map_err(|e| RemoteError::from_io(path, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| RemoteError::from_io(path, e))?
        {
            let meta = match entry.metadata().await {
                Ok(meta) => meta,
                // Removed between readdir and stat.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(RemoteError::from_io(path, e)),
            };
            entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                metadata: metadata_from_fs(&meta),
            });
        }
        Ok(entries)
    }

    async fn open_read(&self, path: &str) -> Result<RemoteReader, RemoteError> {
        let file = tokio::fs::File::open(self.resolve(path))
            .await
            .map_err(|e| RemoteError::from_io(path, e))?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &str) -> Result<RemoteWriter, RemoteError> {
        let file = tokio::fs::File::create(self.resolve(path))
            .await
            .map_err(|e| RemoteError::from_io(path, e))?;
        Ok(Box::new(file))
    }

    async fn mkdir(&self, path: &str) -> Result<(), RemoteError> {
        tokio::fs::create_dir(self.resolve(path))
            .await
            .map_err(|e| RemoteError::from_io(path, e))
    }
}

#[async_trait]
impl RemoteConnector for LocalStore {
    async fn connect(&self) -> Result<Arc<dyn RemoteStore>, RemoteError> {
        Ok(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[tokio::test]
    async fn write_then_read_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        store.mkdir("/docs").await.unwrap();
        let mut writer = store.open_write("/docs/a.txt").await.unwrap();
        writer.write_all(b"hello").await.unwrap();
        writer.shutdown().await.unwrap();

        let mut reader = store.open_read("/docs/a.txt").await.unwrap();
        let mut body = String::new();
        reader.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "hello");

        let meta = store.stat("/docs/a.txt").await.unwrap();
        assert_eq!(meta.kind, EntryKind::File);
        assert_eq!(meta.size, 5);
        assert!(meta.modified.is_some());
    }

    #[tokio::test]
    async fn missing_paths_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        assert_matches!(store.stat("/nope").await, Err(RemoteError::NotFound(_)));
        assert_matches!(store.read_dir("/nope").await, Err(RemoteError::NotFound(_)));
        assert!(matches!(
            store.open_read("/nope").await,
            Err(RemoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn parent_segments_cannot_escape_root() {
        let outer = tempfile::tempdir().unwrap();
        std::fs::create_dir(outer.path().join("jail")).unwrap();
        std::fs::write(outer.path().join("secret.txt"), b"s").unwrap();
        let store = LocalStore::new(outer.path().join("jail"));

        assert_matches!(
            store.stat("/../secret.txt").await,
            Err(RemoteError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn read_dir_lists_children_with_kinds() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("f.bin"), [0u8; 3]).unwrap();
        let store = LocalStore::new(dir.path());

        let mut entries = store.read_dir("/").await.unwrap();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "f.bin");
        assert_eq!(entries[0].metadata.size, 3);
        assert!(entries[1].metadata.is_dir());
    }
}
