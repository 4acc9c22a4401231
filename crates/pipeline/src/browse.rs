//! Directory listing, directory creation and uploads against the remote store.

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use burrow_core::error::CoreError;
use burrow_core::path_recovery;
use burrow_core::paths;
use burrow_core::remote::{EntryKind, RemoteError, RemoteStore};

use crate::staging::TRANSFER_CHUNK_SIZE;

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size: u64,
    /// Modification time in milliseconds since the Unix epoch (0 if unknown).
    pub modified: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listing {
    Entries {
        path: String,
        entries: Vec<DirectoryEntry>,
    },
    /// The directory is gone; `fallback_path` is the closest ancestor that
    /// still exists.
    Deleted {
        deleted_path: String,
        fallback_path: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub path: String,
    pub bytes: u64,
}

/// List `path`, newest first, without dot-files.
pub async fn list_directory(store: &dyn RemoteStore, path: &str) -> Result<Listing, CoreError> {
    let path = paths::normalize(path);

    let entries = match store.read_dir(&path).await {
        Ok(entries) => entries,
        Err(RemoteError::NotFound(_)) => {
            let fallback_path = path_recovery::resolve_existing(store, &path).await?;
            tracing::info!(path = %path, fallback = %fallback_path, "Listed directory no longer exists");
            return Ok(Listing::Deleted {
                deleted_path: path,
                fallback_path,
            });
        }
        Err(e) => return Err(e.into()),
    };

    let mut entries: Vec<DirectoryEntry> = entries
        .into_iter()
        .filter(|e| !paths::is_hidden(&e.name))
        .map(|e| DirectoryEntry {
            name: e.name,
            kind: e.metadata.kind,
            size: e.metadata.size,
            modified: e.metadata.modified.unwrap_or(0).saturating_mul(1000),
        })
        .collect();
    entries.sort_by(|a, b| b.modified.cmp(&a.modified));

    Ok(Listing::Entries { path, entries })
}

/// Create `name` inside `base`. Fails with `Conflict` if anything already
/// exists at the target.
pub async fn create_directory(
    store: &dyn RemoteStore,
    base: &str,
    name: &str,
) -> Result<String, CoreError> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(CoreError::Validation(format!(
            "Invalid directory name: {name:?}"
        )));
    }

    let target = paths::join(&paths::normalize(base), name);
    match store.stat(&target).await {
        Ok(_) => Err(CoreError::Conflict(format!("{target} already exists"))),
        Err(RemoteError::NotFound(_)) => {
            store.mkdir(&target).await?;
            tracing::info!(path = %target, "Directory created");
            Ok(target)
        }
        Err(e) => Err(e.into()),
    }
}

/// `mkdir -p` for a remote directory.
pub async fn ensure_directory(store: &dyn RemoteStore, path: &str) -> Result<(), RemoteError> {
    let path = paths::normalize(path);
    let mut current = String::from("/");

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        current = paths::join(&current, segment);
        match store.stat(&current).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(RemoteError::Other(format!(
                    "{current} exists and is not a directory"
                )))
            }
            Err(RemoteError::NotFound(_)) => store.mkdir(&current).await?,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// First free path among `path`, `{stem} copy1{ext}`, `{stem} copy2{ext}`, ...
pub async fn unique_file_path(store: &dyn RemoteStore, path: &str) -> Result<String, RemoteError> {
    let dir = paths::parent(path);
    let (stem, ext) = paths::split_extension(paths::basename(path));
    let mut candidate = path.to_string();
    let mut counter = 1u32;

    loop {
        match store.stat(&candidate).await {
            Ok(_) => {
                candidate = paths::join(&dir, &format!("{stem} copy{counter}{ext}"));
                counter += 1;
            }
            Err(RemoteError::NotFound(_)) => return Ok(candidate),
            Err(e) => return Err(e),
        }
    }
}

/// Upload one file into `dest_dir`.
///
/// `file_name` may carry a relative path (folder uploads); intermediate
/// directories are created, but the result must stay inside `dest_dir`.
/// An existing file is never overwritten: the upload gets a `copyN` name.
pub async fn upload_file<R>(
    store: &dyn RemoteStore,
    dest_dir: &str,
    file_name: &str,
    mut reader: R,
) -> Result<UploadedFile, CoreError>
where
    R: AsyncRead + Unpin,
{
    let dest_dir = paths::normalize(dest_dir);
    let requested = paths::normalize(&paths::join(&dest_dir, file_name));
    let inside = if paths::is_root(&dest_dir) {
        !paths::is_root(&requested)
    } else {
        requested.starts_with(&format!("{dest_dir}/"))
    };
    if !inside || file_name.trim().is_empty() {
        return Err(CoreError::Validation(format!(
            "Invalid upload file name: {file_name:?}"
        )));
    }

    ensure_directory(store, &paths::parent(&requested)).await?;
    let target = unique_file_path(store, &requested).await?;

    let mut writer = store.open_write(&target).await?;
    let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
    let mut bytes = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| RemoteError::from_io(&target, e))?;
        bytes += n as u64;
    }
    writer
        .shutdown()
        .await
        .map_err(|e| RemoteError::from_io(&target, e))?;

    tracing::info!(path = %target, bytes, "File uploaded");
    Ok(UploadedFile {
        path: target,
        bytes,
    })
}
