//! Startup sweep that fills the video thumbnail cache.
//!
//! Runs once, in the background, after the server starts listening. A
//! failure is logged and never stops the service.

use tokio_util::sync::CancellationToken;

use burrow_pipeline::precache::precache_videos;
use burrow_pipeline::ThumbnailCache;

/// Run the sweep over `root` unless `cancel` fires first.
pub async fn run(cache: ThumbnailCache, root: String, cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!("Thumbnail sweep cancelled");
        }
        result = precache_videos(&cache, &root) => match result {
            Ok(report) => tracing::info!(
                generated = report.generated,
                placeholders = report.placeholders,
                already_cached = report.already_cached,
                failed = report.failed,
                "Thumbnail sweep complete"
            ),
            Err(e) => tracing::error!(root = %root, error = %e, "Thumbnail sweep could not start"),
        },
    }
}
