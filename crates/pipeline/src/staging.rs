//! Copying remote files and directory trees to local disk.

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use burrow_core::paths;
use burrow_core::remote::{RemoteError, RemoteStore};

use crate::error::TransferError;
use crate::progress::PhaseProgress;

/// Read buffer size for remote transfers.
pub const TRANSFER_CHUNK_SIZE: usize = 64 * 1024;

/// A single read that yields nothing for this long aborts the transfer.
pub const TRANSFER_IO_TIMEOUT: Duration = Duration::from_secs(300);

/// One file found while enumerating a remote directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    pub remote_path: String,
    /// `/`-separated path relative to the enumerated root.
    pub relative: String,
    pub size: u64,
}

/// Flattened view of a remote directory.
#[derive(Debug, Clone, Default)]
pub struct RemoteTree {
    pub files: Vec<TreeFile>,
    /// Relative paths of every subdirectory, parents before children.
    pub directories: Vec<String>,
    pub total_bytes: u64,
}

/// Recursively list everything under `root`.
pub async fn enumerate(store: &dyn RemoteStore, root: &str) -> Result<RemoteTree, RemoteError> {
    let mut tree = RemoteTree::default();
    // (remote path, relative path)
    let mut pending = vec![(root.to_string(), String::new())];

    while let Some((dir, relative)) = pending.pop() {
        let mut entries = store.read_dir(&dir).await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        for entry in entries {
            let remote_path = paths::join(&dir, &entry.name);
            let child_relative = if relative.is_empty() {
                entry.name.clone()
            } else {
                format!("{relative}/{}", entry.name)
            };

            if entry.metadata.is_dir() {
                tree.directories.push(child_relative.clone());
                pending.push((remote_path, child_relative));
            } else {
                tree.total_bytes += entry.metadata.size;
                tree.files.push(TreeFile {
                    remote_path,
                    relative: child_relative,
                    size: entry.metadata.size,
                });
            }
        }
    }

    Ok(tree)
}

/// Stream one remote file to `dest`, calling `on_chunk` with the size of
/// every chunk written. Returns the number of bytes copied.
///
/// A partially written `dest` is left behind on failure; callers own cleanup.
pub async fn copy_remote_file(
    store: &dyn RemoteStore,
    remote_path: &str,
    dest: &Path,
    mut on_chunk: impl FnMut(u64),
) -> Result<u64, TransferError> {
    let mut reader = store.open_read(remote_path).await?;
    let mut file = tokio::fs::File::create(dest).await?;
    let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
    let mut copied = 0u64;

    loop {
        let n = tokio::time::timeout(TRANSFER_IO_TIMEOUT, reader.read(&mut buf))
            .await
            .map_err(|_| TransferError::Stalled {
                path: remote_path.to_string(),
                timeout: TRANSFER_IO_TIMEOUT,
            })?
            .map_err(|e| RemoteError::from_io(remote_path, e))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n]).await?;
        copied += n as u64;
        on_chunk(n as u64);
    }

    file.flush().await?;
    Ok(copied)
}

/// Copy every file of `tree` under `dest`, recreating the directory layout
/// (including empty directories) and reporting bytes to `progress`.
pub async fn stage_tree(
    store: &dyn RemoteStore,
    tree: &RemoteTree,
    dest: &Path,
    progress: &mut PhaseProgress,
) -> Result<(), TransferError> {
    tokio::fs::create_dir_all(dest).await?;
    for dir in &tree.directories {
        tokio::fs::create_dir_all(dest.join(dir)).await?;
    }

    for file in &tree.files {
        let local = dest.join(&file.relative);
        copy_remote_file(store, &file.remote_path, &local, |n| progress.advance(n)).await?;
        tracing::trace!(remote = %file.remote_path, bytes = file.size, "Staged file");
    }
    Ok(())
}
