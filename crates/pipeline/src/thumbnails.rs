//! Thumbnail cache backed by local directories.
//!
//! A cache entry is the file `{cache_dir}/{basename}.jpg`; its existence is
//! the whole state. Video thumbnails live in the video cache directory, all
//! other kinds in the image cache directory. Entries never expire.
//!
//! On a miss the cache fetches the source over its own remote session,
//! submits a conversion to the worker pool and renames the finished JPEG
//! into place. Concurrent requests for one entry share a single generation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

use burrow_core::error::CoreError;
use burrow_core::ffmpeg::{FALLBACK_FRAME_OFFSET, PRIMARY_FRAME_OFFSET};
use burrow_core::media::{cache_file_name, PreviewKind};
use burrow_core::paths;
use burrow_core::remote::{RemoteConnector, RemoteStore};
use burrow_worker::{ConversionInput, ConversionKind, ConversionPool, ConversionTask};

use crate::error::PreviewError;
use crate::staging;

/// Side length of the generated placeholder.
const PLACEHOLDER_SIZE: u32 = 64;

/// File name of the placeholder inside the image cache directory.
const PLACEHOLDER_FILE: &str = ".placeholder.jpg";

type Outcome = Result<Preview, PreviewError>;

/// A thumbnail ready to be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preview {
    /// A real cache entry.
    Cached(PathBuf),
    /// Conversion failed; serve the shared placeholder.
    Placeholder(PathBuf),
}

impl Preview {
    pub fn path(&self) -> &Path {
        match self {
            Preview::Cached(p) | Preview::Placeholder(p) => p,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Preview::Placeholder(_))
    }
}

/// What a preview request resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewTarget {
    Thumbnail(Preview),
    /// No preview kind for this file; stream the original bytes.
    Passthrough,
}

/// Directories used by the cache.
#[derive(Debug, Clone)]
pub struct CacheDirs {
    pub image_cache_dir: PathBuf,
    pub video_cache_dir: PathBuf,
    /// Where video and PDF sources are staged while converting.
    pub temp_dir: PathBuf,
}

/// Whether a failed generation should leave the placeholder behind as the
/// cache entry (so it is never retried) or just be served once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    ServePlaceholder,
    PersistPlaceholder,
}

struct CacheInner {
    dirs: CacheDirs,
    placeholder: PathBuf,
    connector: Arc<dyn RemoteConnector>,
    pool: ConversionPool,
    inflight: Mutex<HashMap<PathBuf, Arc<OnceCell<Outcome>>>>,
}

/// Cheap to clone; clones share the in-flight map.
#[derive(Clone)]
pub struct ThumbnailCache {
    inner: Arc<CacheInner>,
}

impl ThumbnailCache {
    /// Create the cache directories and the placeholder image, then build
    /// the cache. `placeholder_source` is re-encoded as JPEG when given;
    /// otherwise a flat grey square is rendered.
    pub async fn init(
        dirs: CacheDirs,
        placeholder_source: Option<PathBuf>,
        connector: Arc<dyn RemoteConnector>,
        pool: ConversionPool,
    ) -> Result<Self, CoreError> {
        for dir in [&dirs.image_cache_dir, &dirs.video_cache_dir, &dirs.temp_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }

        let placeholder = dirs.image_cache_dir.join(PLACEHOLDER_FILE);
        write_placeholder(placeholder_source, placeholder.clone()).await?;
        tracing::info!(
            image_cache = %dirs.image_cache_dir.display(),
            video_cache = %dirs.video_cache_dir.display(),
            "Thumbnail cache ready"
        );

        Ok(Self {
            inner: Arc::new(CacheInner {
                dirs,
                placeholder,
                connector,
                pool,
                inflight: Mutex::new(HashMap::new()),
            }),
        })
    }

    pub fn placeholder(&self) -> &Path {
        &self.inner.placeholder
    }

    pub fn connector(&self) -> Arc<dyn RemoteConnector> {
        Arc::clone(&self.inner.connector)
    }

    /// Location of the cache entry for `remote_path`.
    pub fn cache_path(&self, remote_path: &str, kind: PreviewKind) -> PathBuf {
        self.inner.cache_path(remote_path, kind)
    }

    /// Classify `remote_path` and produce its thumbnail, or report that the
    /// file should be streamed unchanged.
    pub async fn preview(&self, remote_path: &str) -> Result<PreviewTarget, PreviewError> {
        match PreviewKind::detect(remote_path) {
            Some(kind) => Ok(PreviewTarget::Thumbnail(
                self.get_or_create(remote_path, kind).await?,
            )),
            None => Ok(PreviewTarget::Passthrough),
        }
    }

    /// Return the cached thumbnail, generating it on a miss.
    ///
    /// A hit touches neither the remote store nor the pool. Conversion
    /// failures degrade to the placeholder; failing to fetch the source is
    /// an error.
    pub async fn get_or_create(&self, remote_path: &str, kind: PreviewKind) -> Outcome {
        let remote_path = paths::normalize(remote_path);
        let cache_path = self.cache_path(&remote_path, kind);
        if is_file(&cache_path).await {
            return Ok(Preview::Cached(cache_path));
        }

        let inner = Arc::clone(&self.inner);
        let target = cache_path.clone();
        self.deduplicated(&cache_path, move || async move {
            let store = inner.connector.connect().await?;
            inner
                .generate(
                    store,
                    &remote_path,
                    kind,
                    &target,
                    &[PRIMARY_FRAME_OFFSET, FALLBACK_FRAME_OFFSET],
                    OnFailure::ServePlaceholder,
                )
                .await
        })
        .await
    }

    /// Generate a video thumbnail over an existing session, persisting the
    /// placeholder as the entry when generation fails. Used by the startup
    /// sweep.
    pub async fn precache_video(
        &self,
        store: Arc<dyn RemoteStore>,
        remote_path: &str,
        offsets: &[Duration],
    ) -> Outcome {
        let remote_path = paths::normalize(remote_path);
        let cache_path = self.cache_path(&remote_path, PreviewKind::Video);
        if is_file(&cache_path).await {
            return Ok(Preview::Cached(cache_path));
        }

        let inner = Arc::clone(&self.inner);
        let target = cache_path.clone();
        let offsets = offsets.to_vec();
        let outcome = self
            .deduplicated(&cache_path, move || async move {
                inner
                    .generate(
                        store,
                        &remote_path,
                        PreviewKind::Video,
                        &target,
                        &offsets,
                        OnFailure::PersistPlaceholder,
                    )
                    .await
            })
            .await?;

        // Joining an interactive generation yields a placeholder that was
        // served but not stored.
        if outcome.is_placeholder() && !is_file(&cache_path).await {
            place_copy(&self.inner.placeholder, &cache_path).await?;
        }
        Ok(outcome)
    }

    /// Run `make` at most once per cache path among concurrent callers.
    ///
    /// The generation runs in its own task so it completes (and cleans up)
    /// even when every waiting request is dropped.
    async fn deduplicated<F, Fut>(&self, cache_path: &Path, make: F) -> Outcome
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Outcome> + Send + 'static,
    {
        let cell = {
            let mut inflight = self.inner.inflight.lock().await;
            Arc::clone(inflight.entry(cache_path.to_path_buf()).or_default())
        };

        let outcome = cell
            .get_or_init(|| async move {
                // Another generation may have finished between our miss and
                // taking the cell.
                if is_file(cache_path).await {
                    return Ok(Preview::Cached(cache_path.to_path_buf()));
                }
                match tokio::spawn(make()).await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(PreviewError::Io(format!("thumbnail generation aborted: {e}"))),
                }
            })
            .await
            .clone();

        let mut inflight = self.inner.inflight.lock().await;
        if inflight
            .get(cache_path)
            .is_some_and(|current| Arc::ptr_eq(current, &cell))
        {
            inflight.remove(cache_path);
        }
        outcome
    }
}

impl CacheInner {
    fn cache_path(&self, remote_path: &str, kind: PreviewKind) -> PathBuf {
        let dir = match kind {
            PreviewKind::Video => &self.dirs.video_cache_dir,
            _ => &self.dirs.image_cache_dir,
        };
        dir.join(cache_file_name(remote_path))
    }

    async fn generate(
        &self,
        store: Arc<dyn RemoteStore>,
        remote_path: &str,
        kind: PreviewKind,
        cache_path: &Path,
        video_offsets: &[Duration],
        on_failure: OnFailure,
    ) -> Outcome {
        let input = self.fetch_source(store.as_ref(), remote_path, kind).await?;
        let staged = match &input {
            ConversionInput::File(path) => Some(path.clone()),
            ConversionInput::Buffer(_) => None,
        };

        let attempts: Vec<ConversionKind> = match kind {
            PreviewKind::Image => vec![ConversionKind::ImageResize],
            PreviewKind::Heic => vec![ConversionKind::HeicToJpeg],
            PreviewKind::Pdf => vec![ConversionKind::PdfFirstPage],
            PreviewKind::Video => video_offsets
                .iter()
                .map(|offset| ConversionKind::VideoFrame { offset: *offset })
                .collect(),
        };

        let converted = self
            .convert(attempts, input, cache_path)
            .await;

        if let Some(path) = staged {
            remove_quietly(&path).await;
        }

        match converted {
            Ok(()) => {
                tracing::info!(remote_path, cache = %cache_path.display(), "Thumbnail cached");
                Ok(Preview::Cached(cache_path.to_path_buf()))
            }
            Err(reason) => {
                tracing::warn!(remote_path, error = %reason, "Thumbnail generation failed, using placeholder");
                if on_failure == OnFailure::PersistPlaceholder {
                    place_copy(&self.placeholder, cache_path).await?;
                }
                Ok(Preview::Placeholder(self.placeholder.clone()))
            }
        }
    }

    /// Fetch the source: images and HEIC into memory, video and PDF into a
    /// uniquely named temp file.
    async fn fetch_source(
        &self,
        store: &dyn RemoteStore,
        remote_path: &str,
        kind: PreviewKind,
    ) -> Result<ConversionInput, PreviewError> {
        if kind.buffers_in_memory() {
            let mut reader = store.open_read(remote_path).await?;
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await?;
            return Ok(ConversionInput::Buffer(buf));
        }

        let ext = paths::extension(remote_path).unwrap_or_else(|| "bin".into());
        let staged = self
            .dirs
            .temp_dir
            .join(format!("{}.{ext}", Uuid::new_v4()));
        if let Err(e) = staging::copy_remote_file(store, remote_path, &staged, |_| {}).await {
            remove_quietly(&staged).await;
            return Err(e.into());
        }
        Ok(ConversionInput::File(staged))
    }

    /// Try each conversion in order until one succeeds; on success the
    /// output is renamed onto `cache_path`. Returns the last failure.
    async fn convert(
        &self,
        attempts: Vec<ConversionKind>,
        input: ConversionInput,
        cache_path: &Path,
    ) -> Result<(), String> {
        let cache_dir = cache_path.parent().unwrap_or(Path::new("."));
        let cache_key = cache_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut last_error = String::from("no conversion attempted");
        let mut input = Some(input);
        let mut attempts = attempts.into_iter().peekable();

        while let Some(kind) = attempts.next() {
            let this_input = if attempts.peek().is_some() {
                input.clone()
            } else {
                input.take()
            };
            let Some(this_input) = this_input else { break };

            let output = cache_dir.join(format!(".tmp-{}.jpg", Uuid::new_v4()));
            let task = ConversionTask {
                kind: kind.clone(),
                input: this_input,
                cache_key: cache_key.clone(),
                output: output.clone(),
            };

            match self.pool.submit(task).await {
                Ok(()) => match tokio::fs::rename(&output, cache_path).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        remove_quietly(&output).await;
                        last_error = format!("could not place thumbnail: {e}");
                    }
                },
                Err(e) => {
                    remove_quietly(&output).await;
                    tracing::debug!(cache_key = %cache_key, ?kind, error = %e, "Conversion attempt failed");
                    last_error = e.to_string();
                }
            }
        }
        Err(last_error)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "Failed to remove temp file");
        }
    }
}

/// Copy `source` to `dest` through a temp file in the same directory.
async fn place_copy(source: &Path, dest: &Path) -> Result<(), PreviewError> {
    let dir = dest.parent().unwrap_or(Path::new("."));
    let temp = dir.join(format!(".tmp-{}.jpg", Uuid::new_v4()));
    tokio::fs::copy(source, &temp).await?;
    if let Err(e) = tokio::fs::rename(&temp, dest).await {
        remove_quietly(&temp).await;
        return Err(e.into());
    }
    Ok(())
}

async fn write_placeholder(source: Option<PathBuf>, dest: PathBuf) -> Result<(), CoreError> {
    tokio::task::spawn_blocking(move || -> Result<(), CoreError> {
        let img = match source {
            Some(path) => image::open(&path).map_err(|e| {
                CoreError::Validation(format!(
                    "placeholder image {} is unreadable: {e}",
                    path.display()
                ))
            })?,
            None => image::DynamicImage::ImageRgb8(image::ImageBuffer::from_pixel(
                PLACEHOLDER_SIZE,
                PLACEHOLDER_SIZE,
                image::Rgb([200u8, 200, 200]),
            )),
        };
        img.to_rgb8()
            .save_with_format(&dest, image::ImageFormat::Jpeg)
            .map_err(|e| CoreError::Internal(format!("cannot write placeholder: {e}")))
    })
    .await
    .map_err(|e| CoreError::Internal(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use burrow_core::local_store::LocalStore;
    use burrow_worker::{ConversionError, Converter};

    use super::*;

    /// Writes a marker JPEG body; fails video extraction at chosen offsets.
    struct FakeConverter {
        calls: AtomicUsize,
        failing_offsets: Vec<Duration>,
        delay: Duration,
    }

    impl FakeConverter {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing_offsets: Vec::new(),
                delay: Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl Converter for FakeConverter {
        async fn convert(&self, task: &ConversionTask) -> Result<(), ConversionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if let ConversionKind::VideoFrame { offset } = &task.kind {
                if self.failing_offsets.contains(offset) {
                    return Err(ConversionError::Timeout(Duration::from_secs(1)));
                }
            }
            tokio::fs::write(&task.output, b"jpeg").await?;
            Ok(())
        }
    }

    struct Fixture {
        _remote: tempfile::TempDir,
        local: tempfile::TempDir,
        cache: ThumbnailCache,
        converter: Arc<FakeConverter>,
    }

    async fn fixture(converter: FakeConverter) -> Fixture {
        let remote = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(remote.path().join("media")).unwrap();
        std::fs::write(remote.path().join("media/clip.mp4"), b"video").unwrap();
        std::fs::write(remote.path().join("media/photo.png"), b"png").unwrap();

        let local = tempfile::tempdir().unwrap();
        let converter = Arc::new(converter);
        let pool = ConversionPool::new(2, converter.clone());
        let dirs = CacheDirs {
            image_cache_dir: local.path().join("image_cache"),
            video_cache_dir: local.path().join("video_cache"),
            temp_dir: local.path().join("tmp"),
        };
        let cache = ThumbnailCache::init(
            dirs,
            None,
            Arc::new(LocalStore::new(remote.path())),
            pool,
        )
        .await
        .unwrap();

        Fixture {
            _remote: remote,
            local,
            cache,
            converter,
        }
    }

    #[tokio::test]
    async fn video_falls_back_to_second_offset_then_hits_cache() {
        let mut converter = FakeConverter::new();
        converter.failing_offsets = vec![PRIMARY_FRAME_OFFSET];
        let f = fixture(converter).await;

        let preview = f
            .cache
            .get_or_create("/media/clip.mp4", PreviewKind::Video)
            .await
            .unwrap();
        let expected = f.local.path().join("video_cache/clip.mp4.jpg");
        assert_eq!(preview, Preview::Cached(expected.clone()));
        assert_eq!(f.converter.calls.load(Ordering::SeqCst), 2);

        let again = f
            .cache
            .get_or_create("/media/clip.mp4", PreviewKind::Video)
            .await
            .unwrap();
        assert_eq!(again, Preview::Cached(expected));
        assert_eq!(f.converter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn repeated_video_failure_serves_placeholder_without_caching() {
        let mut converter = FakeConverter::new();
        converter.failing_offsets = vec![PRIMARY_FRAME_OFFSET, FALLBACK_FRAME_OFFSET];
        let f = fixture(converter).await;

        let preview = f
            .cache
            .get_or_create("/media/clip.mp4", PreviewKind::Video)
            .await
            .unwrap();
        assert!(preview.is_placeholder());
        assert_eq!(preview.path(), f.cache.placeholder());
        assert!(!f.local.path().join("video_cache/clip.mp4.jpg").exists());
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_conversion() {
        let mut converter = FakeConverter::new();
        converter.delay = Duration::from_millis(50);
        let f = fixture(converter).await;

        let (a, b) = tokio::join!(
            f.cache.get_or_create("/media/photo.png", PreviewKind::Image),
            f.cache.get_or_create("/media/photo.png", PreviewKind::Image),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(f.converter.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_source_is_an_error() {
        let f = fixture(FakeConverter::new()).await;
        let result = f
            .cache
            .get_or_create("/media/gone.png", PreviewKind::Image)
            .await;
        assert_matches!(result, Err(PreviewError::NotFound(_)));
        assert_eq!(f.converter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_extension_is_passthrough() {
        let f = fixture(FakeConverter::new()).await;
        let target = f.cache.preview("/server.properties").await.unwrap();
        assert_eq!(target, PreviewTarget::Passthrough);
    }

    #[tokio::test]
    async fn staged_video_sources_are_removed() {
        let f = fixture(FakeConverter::new()).await;
        f.cache
            .get_or_create("/media/clip.mp4", PreviewKind::Video)
            .await
            .unwrap();
        let leftovers = std::fs::read_dir(f.local.path().join("tmp")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn precache_persists_placeholder_on_failure() {
        let mut converter = FakeConverter::new();
        converter.failing_offsets = vec![PRIMARY_FRAME_OFFSET, FALLBACK_FRAME_OFFSET];
        let f = fixture(converter).await;
        let store = f.cache.connector().connect().await.unwrap();

        let preview = f
            .cache
            .precache_video(
                store,
                "/media/clip.mp4",
                &[PRIMARY_FRAME_OFFSET, FALLBACK_FRAME_OFFSET],
            )
            .await
            .unwrap();
        assert!(preview.is_placeholder());

        let entry = f.local.path().join("video_cache/clip.mp4.jpg");
        assert!(entry.exists());

        // The persisted placeholder counts as a hit from now on.
        let calls = f.converter.calls.load(Ordering::SeqCst);
        let hit = f
            .cache
            .get_or_create("/media/clip.mp4", PreviewKind::Video)
            .await
            .unwrap();
        assert_eq!(hit, Preview::Cached(entry));
        assert_eq!(f.converter.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn precache_joining_interactive_request_still_persists_placeholder() {
        let mut converter = FakeConverter::new();
        converter.failing_offsets = vec![PRIMARY_FRAME_OFFSET, FALLBACK_FRAME_OFFSET];
        converter.delay = Duration::from_millis(100);
        let f = fixture(converter).await;

        let interactive = {
            let cache = f.cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_create("/media/clip.mp4", PreviewKind::Video)
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let store = f.cache.connector().connect().await.unwrap();
        let swept = f
            .cache
            .precache_video(
                store,
                "/media/clip.mp4",
                &[PRIMARY_FRAME_OFFSET, FALLBACK_FRAME_OFFSET],
            )
            .await
            .unwrap();
        assert!(swept.is_placeholder());
        assert!(interactive.await.unwrap().unwrap().is_placeholder());

        // One shared generation, and its failure is now on disk.
        assert_eq!(f.converter.calls.load(Ordering::SeqCst), 2);
        assert!(f.local.path().join("video_cache/clip.mp4.jpg").is_file());
    }
}
