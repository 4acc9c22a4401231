//! Startup sweep that pre-generates video thumbnails.
//!
//! Walks the remote tree sequentially over one session. Files that cannot be
//! converted get the placeholder persisted as their entry so later sweeps
//! and requests do not retry them.

use std::time::Duration;

use serde::Serialize;

use burrow_core::ffmpeg::{FALLBACK_FRAME_OFFSET, SWEEP_FRAME_OFFSET};
use burrow_core::media::PreviewKind;
use burrow_core::paths;
use burrow_core::remote::RemoteError;

use crate::thumbnails::{is_file, ThumbnailCache};

/// Offsets tried by the sweep, in order.
pub const SWEEP_OFFSETS: [Duration; 2] = [SWEEP_FRAME_OFFSET, FALLBACK_FRAME_OFFSET];

/// Counters reported when the sweep finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub directories: usize,
    pub already_cached: usize,
    pub generated: usize,
    pub placeholders: usize,
    pub failed: usize,
}

/// Generate thumbnails for every video below `root` that has no entry yet.
///
/// Only failing to open the session aborts the sweep; unreadable
/// directories and unfetchable files are logged and skipped.
pub async fn precache_videos(
    cache: &ThumbnailCache,
    root: &str,
) -> Result<SweepReport, RemoteError> {
    let store = cache.connector().connect().await?;
    let mut report = SweepReport::default();
    let mut pending = vec![paths::normalize(root)];

    tracing::info!(root = %pending[0], "Starting video thumbnail sweep");

    while let Some(dir) = pending.pop() {
        let mut entries = match store.read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %dir, error = %e, "Sweep skipping unreadable directory");
                report.failed += 1;
                continue;
            }
        };
        report.directories += 1;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        for entry in entries {
            let path = paths::join(&dir, &entry.name);
            if entry.metadata.is_dir() {
                pending.push(path);
                continue;
            }
            if PreviewKind::detect(&entry.name) != Some(PreviewKind::Video) {
                continue;
            }
            if is_file(&cache.cache_path(&path, PreviewKind::Video)).await {
                report.already_cached += 1;
                continue;
            }

            match cache.precache_video(store.clone(), &path, &SWEEP_OFFSETS).await {
                Ok(preview) if preview.is_placeholder() => report.placeholders += 1,
                Ok(_) => report.generated += 1,
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Sweep could not fetch video");
                    report.failed += 1;
                }
            }
        }
    }

    tracing::info!(?report, "Video thumbnail sweep finished");
    Ok(report)
}
