//! Zip packaging of staged download trees.
//!
//! Runs synchronously; callers put it on a blocking thread. The deadline is
//! checked between chunks, so a runaway packaging step stops within one
//! chunk of the limit.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Instant;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::DownloadError;
use crate::staging::TRANSFER_CHUNK_SIZE;

/// Entries at or above this size need ZIP64 headers.
const LARGE_FILE_THRESHOLD: u64 = u32::MAX as u64;

/// Archive `source` into `archive`. Entry names are prefixed with the name
/// of `source` itself, so unpacking yields one top-level folder.
///
/// `on_bytes` receives the size of every chunk of file data written.
pub fn zip_directory(
    source: &Path,
    archive: &Path,
    deadline: Instant,
    started: Instant,
    mut on_bytes: impl FnMut(u64),
) -> Result<u64, DownloadError> {
    let base = source.parent().unwrap_or(source);
    let mut zip = ZipWriter::new(BufWriter::new(File::create(archive)?));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let mut buf = vec![0u8; TRANSFER_CHUNK_SIZE];
    let mut written = 0u64;

    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        let name = entry_name(base, entry.path())?;

        if entry.file_type().is_dir() {
            zip.add_directory(name, options)?;
            continue;
        }
        if !entry.file_type().is_file() {
            continue;
        }

        let mut input = File::open(entry.path())?;
        let len = input.metadata()?.len();
        zip.start_file(name, options.large_file(len >= LARGE_FILE_THRESHOLD))?;
        loop {
            if Instant::now() > deadline {
                return Err(DownloadError::Timeout(deadline - started));
            }
            let n = input.read(&mut buf)?;
            if n == 0 {
                break;
            }
            zip.write_all(&buf[..n])?;
            written += n as u64;
            on_bytes(n as u64);
        }
    }

    let mut out = zip.finish()?;
    out.flush()?;
    Ok(written)
}

/// `/`-separated archive path of `path` relative to `base`.
fn entry_name(base: &Path, path: &Path) -> Result<String, DownloadError> {
    let relative = path
        .strip_prefix(base)
        .map_err(|e| DownloadError::Aborted(format!("unexpected path {}: {e}", path.display())))?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Ok(parts.join("/"))
}
