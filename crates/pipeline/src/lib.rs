//! Preview and download pipeline.
//!
//! Glues the remote store, the conversion pool and the progress bus into the
//! operations the API serves: directory browsing, cached thumbnails, the
//! startup video sweep and background download jobs.

pub mod archive;
pub mod browse;
pub mod downloads;
pub mod error;
pub mod precache;
pub mod progress;
pub mod staging;
pub mod thumbnails;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use burrow_core::error::CoreError;
use burrow_core::remote::RemoteConnector;
use burrow_events::bus::ProgressBus;
use burrow_worker::{ConversionPool, Converter};

pub use downloads::{DownloadConfig, DownloadManager, JobSnapshot, JobStatus};
pub use thumbnails::{CacheDirs, Preview, PreviewTarget, ThumbnailCache};

/// Everything needed to stand up the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cache_dirs: CacheDirs,
    pub placeholder_image: Option<PathBuf>,
    pub downloads_dir: PathBuf,
    pub archive_timeout: Duration,
    pub workers: usize,
}

/// Initialised pipeline services, shared by the API.
#[derive(Clone)]
pub struct Pipeline {
    pub connector: Arc<dyn RemoteConnector>,
    pub pool: ConversionPool,
    pub thumbnails: ThumbnailCache,
    pub downloads: Arc<DownloadManager>,
    pub bus: Arc<ProgressBus>,
}

impl Pipeline {
    /// Create cache and download directories, render the placeholder and
    /// start the worker pool. Must run before serving any request.
    pub async fn init(
        config: PipelineConfig,
        connector: Arc<dyn RemoteConnector>,
        converter: Arc<dyn Converter>,
        bus: Arc<ProgressBus>,
    ) -> Result<Self, CoreError> {
        tokio::fs::create_dir_all(&config.downloads_dir).await?;

        let pool = ConversionPool::new(config.workers, converter);
        let thumbnails = ThumbnailCache::init(
            config.cache_dirs,
            config.placeholder_image,
            Arc::clone(&connector),
            pool.clone(),
        )
        .await?;

        let downloads = Arc::new(DownloadManager::new(
            DownloadConfig {
                downloads_dir: config.downloads_dir,
                archive_timeout: config.archive_timeout,
            },
            Arc::clone(&connector),
            Arc::clone(&bus),
        ));

        Ok(Self {
            connector,
            pool,
            thumbnails,
            downloads,
            bus,
        })
    }
}
