use std::path::PathBuf;
use std::time::Duration;

use burrow_core::ffmpeg::FfmpegError;
use burrow_core::subprocess::ToolError;

/// What a conversion produces from its input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionKind {
    /// Decode a raster image and shrink it to thumbnail size.
    ImageResize,
    /// Decode a HEIC photo to JPEG, then shrink it.
    HeicToJpeg,
    /// Grab one video frame at `offset`.
    VideoFrame { offset: Duration },
    /// Rasterise page 1 of a PDF.
    PdfFirstPage,
}

/// Where the source bytes are.
#[derive(Debug, Clone)]
pub enum ConversionInput {
    Buffer(Vec<u8>),
    File(PathBuf),
}

/// A unit of work for the pool. Dropped once its result is delivered.
#[derive(Debug, Clone)]
pub struct ConversionTask {
    pub kind: ConversionKind,
    pub input: ConversionInput,
    /// Cache entry this task populates; used for logging and pool stats.
    pub cache_key: String,
    /// File the converter writes the JPEG to on success.
    pub output: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("video frame extraction failed: {0}")]
    Ffmpeg(#[from] FfmpegError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("{kind:?} cannot take a {input} input")]
    UnsupportedInput {
        kind: ConversionKind,
        input: &'static str,
    },

    #[error("conversion exceeded {0:?}")]
    Timeout(Duration),

    #[error("worker panicked while converting {0}")]
    WorkerPanicked(String),

    #[error("conversion pool is shut down")]
    PoolClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
