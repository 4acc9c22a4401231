//! Conversion backends executed by pool workers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};

use burrow_core::ffmpeg;
use burrow_core::media::{THUMBNAIL_MAX_HEIGHT, THUMBNAIL_MAX_WIDTH};
use burrow_core::subprocess::run_tool;

use crate::task::{ConversionError, ConversionInput, ConversionKind, ConversionTask};

/// Executes one conversion task, writing the JPEG to `task.output`.
///
/// Implementations must bound their own runtime; the pool does not time
/// tasks out on their behalf.
#[async_trait]
pub trait Converter: Send + Sync + 'static {
    async fn convert(&self, task: &ConversionTask) -> Result<(), ConversionError>;
}

// ---------------------------------------------------------------------------
// ToolConverter
// ---------------------------------------------------------------------------

/// Binaries used for the conversions that are not done in-process.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub ffmpeg: String,
    pub heif_convert: String,
    pub pdftoppm: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".into(),
            heif_convert: "heif-convert".into(),
            pdftoppm: "pdftoppm".into(),
        }
    }
}

/// Production converter: `image` for raster images, external tools for
/// everything else. Each step is killed after `timeout`.
#[derive(Debug, Clone)]
pub struct ToolConverter {
    tools: ToolPaths,
    timeout: Duration,
}

impl ToolConverter {
    pub fn new(tools: ToolPaths, timeout: Duration) -> Self {
        Self { tools, timeout }
    }

    async fn resize(&self, input: ConversionInput, output: &Path) -> Result<(), ConversionError> {
        let job = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ConversionError> {
            let img = match input {
                ConversionInput::Buffer(bytes) => image::load_from_memory(&bytes)?,
                ConversionInput::File(path) => image::open(path)?,
            };
            encode_thumbnail(img)
        });

        // A blocking decode cannot be interrupted; on timeout it finishes in
        // the background and its bytes are dropped.
        let jpeg = match tokio::time::timeout(self.timeout, job).await {
            Ok(Ok(result)) => result?,
            Ok(Err(join_err)) => return Err(ConversionError::WorkerPanicked(join_err.to_string())),
            Err(_) => return Err(ConversionError::Timeout(self.timeout)),
        };
        tokio::fs::write(output, jpeg).await?;
        Ok(())
    }

    async fn heic(&self, task: &ConversionTask) -> Result<(), ConversionError> {
        let source = sibling(&task.output, "src.heic");
        let decoded = sibling(&task.output, "full.jpg");

        let result = async {
            let input_path = match &task.input {
                ConversionInput::Buffer(bytes) => {
                    tokio::fs::write(&source, bytes).await?;
                    source.clone()
                }
                ConversionInput::File(path) => path.clone(),
            };
            run_tool(
                &self.tools.heif_convert,
                [input_path.as_os_str(), decoded.as_os_str()],
                self.timeout,
            )
            .await?;
            self.resize(ConversionInput::File(decoded.clone()), &task.output)
                .await
        }
        .await;

        remove_quietly(&source).await;
        remove_quietly(&decoded).await;
        result
    }

    async fn pdf(&self, task: &ConversionTask) -> Result<(), ConversionError> {
        let ConversionInput::File(input) = &task.input else {
            return Err(ConversionError::UnsupportedInput {
                kind: task.kind.clone(),
                input: "buffer",
            });
        };

        // pdftoppm appends ".jpg" to the prefix it is given.
        let prefix = sibling(&task.output, "page");
        let rendered = sibling(&task.output, "page.jpg");
        let scale = THUMBNAIL_MAX_WIDTH.to_string();

        let args: Vec<&std::ffi::OsStr> = vec![
            "-jpeg".as_ref(),
            "-f".as_ref(),
            "1".as_ref(),
            "-l".as_ref(),
            "1".as_ref(),
            "-singlefile".as_ref(),
            "-scale-to".as_ref(),
            scale.as_ref(),
            input.as_os_str(),
            prefix.as_os_str(),
        ];
        let result = run_tool(&self.tools.pdftoppm, args, self.timeout).await;
        if let Err(e) = result {
            remove_quietly(&rendered).await;
            return Err(e.into());
        }
        tokio::fs::rename(&rendered, &task.output).await?;
        Ok(())
    }
}

#[async_trait]
impl Converter for ToolConverter {
    async fn convert(&self, task: &ConversionTask) -> Result<(), ConversionError> {
        match &task.kind {
            ConversionKind::ImageResize => self.resize(task.input.clone(), &task.output).await,
            ConversionKind::HeicToJpeg => self.heic(task).await,
            ConversionKind::VideoFrame { offset } => {
                let ConversionInput::File(video) = &task.input else {
                    return Err(ConversionError::UnsupportedInput {
                        kind: task.kind.clone(),
                        input: "buffer",
                    });
                };
                ffmpeg::extract_frame(
                    &self.tools.ffmpeg,
                    video,
                    &task.output,
                    *offset,
                    self.timeout,
                )
                .await?;
                Ok(())
            }
            ConversionKind::PdfFirstPage => self.pdf(task).await,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Shrink to fit the thumbnail bounds (never enlarge) and encode as JPEG.
fn encode_thumbnail(img: DynamicImage) -> Result<Vec<u8>, ConversionError> {
    let img = if img.width() > THUMBNAIL_MAX_WIDTH || img.height() > THUMBNAIL_MAX_HEIGHT {
        img.thumbnail(THUMBNAIL_MAX_WIDTH, THUMBNAIL_MAX_HEIGHT)
    } else {
        img
    };
    let mut jpeg = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img.to_rgb8()).write_to(&mut jpeg, ImageFormat::Jpeg)?;
    Ok(jpeg.into_inner())
}

/// `/dir/.tmp-x.jpg` + `page` -> `/dir/.tmp-x.page`.
fn sibling(output: &Path, suffix: &str) -> PathBuf {
    output.with_extension(suffix)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "Failed to remove temp file");
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use image::{ImageBuffer, Rgb};

    use super::*;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(width, height, Rgb([10u8, 120, 200]));
        let mut cursor = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    fn task(kind: ConversionKind, input: ConversionInput, output: PathBuf) -> ConversionTask {
        ConversionTask {
            kind,
            input,
            cache_key: "test.jpg".into(),
            output,
        }
    }

    #[tokio::test]
    async fn large_image_is_shrunk_to_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("thumb.jpg");
        let converter = ToolConverter::new(ToolPaths::default(), Duration::from_secs(30));

        converter
            .convert(&task(
                ConversionKind::ImageResize,
                ConversionInput::Buffer(png_bytes(1600, 900)),
                output.clone(),
            ))
            .await
            .unwrap();

        let thumb = image::open(&output).unwrap();
        assert_eq!(thumb.width(), 800);
        assert_eq!(thumb.height(), 450);
    }

    #[tokio::test]
    async fn small_image_keeps_its_size() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("thumb.jpg");
        let converter = ToolConverter::new(ToolPaths::default(), Duration::from_secs(30));

        converter
            .convert(&task(
                ConversionKind::ImageResize,
                ConversionInput::Buffer(png_bytes(40, 30)),
                output.clone(),
            ))
            .await
            .unwrap();

        let thumb = image::open(&output).unwrap();
        assert_eq!((thumb.width(), thumb.height()), (40, 30));
    }

    #[tokio::test]
    async fn corrupt_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let converter = ToolConverter::new(ToolPaths::default(), Duration::from_secs(30));

        let result = converter
            .convert(&task(
                ConversionKind::ImageResize,
                ConversionInput::Buffer(b"not an image".to_vec()),
                dir.path().join("thumb.jpg"),
            ))
            .await;
        assert_matches!(result, Err(ConversionError::Image(_)));
    }

    #[tokio::test]
    async fn timed_out_resize_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("thumb.jpg");
        let converter = ToolConverter::new(ToolPaths::default(), Duration::ZERO);

        let result = converter
            .convert(&task(
                ConversionKind::ImageResize,
                ConversionInput::Buffer(png_bytes(2400, 1600)),
                output.clone(),
            ))
            .await;
        assert_matches!(result, Err(ConversionError::Timeout(_)));

        // Give the abandoned decode time to finish.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn video_from_buffer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let converter = ToolConverter::new(ToolPaths::default(), Duration::from_secs(30));

        let result = converter
            .convert(&task(
                ConversionKind::VideoFrame {
                    offset: Duration::from_secs(1),
                },
                ConversionInput::Buffer(vec![0; 4]),
                dir.path().join("thumb.jpg"),
            ))
            .await;
        assert_matches!(result, Err(ConversionError::UnsupportedInput { .. }));
    }

    #[test]
    fn sibling_replaces_extension() {
        let out = Path::new("/cache/.tmp-1.jpg");
        assert_eq!(sibling(out, "page"), PathBuf::from("/cache/.tmp-1.page"));
        assert_eq!(sibling(out, "page.jpg"), PathBuf::from("/cache/.tmp-1.page.jpg"));
    }
}
