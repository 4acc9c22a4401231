//! FFmpeg frame extraction for video thumbnails.

use std::path::Path;
use std::time::Duration;

use crate::subprocess::{run_tool, ToolError};

/// Offset tried first when grabbing a representative frame.
pub const PRIMARY_FRAME_OFFSET: Duration = Duration::from_secs(1);

/// Offset tried when the primary extraction fails (e.g. clips shorter than 1 s).
pub const FALLBACK_FRAME_OFFSET: Duration = Duration::ZERO;

/// Offset used by the startup sweep, which favours a frame further into the clip.
pub const SWEEP_FRAME_OFFSET: Duration = Duration::from_secs(60);

/// Scale filter bounding the frame to 800x600 while keeping its aspect ratio.
const SCALE_FILTER: &str =
    "scale=w=800:h=600:force_original_aspect_ratio=decrease,eq=brightness=0.05:saturation=1.2";

#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("ffmpeg produced no frame at {timestamp}")]
    NoFrame { timestamp: String },

    #[error("video file not found: {0}")]
    VideoNotFound(String),
}

/// Format an offset the way ffmpeg's `-ss` expects it (`HH:MM:SS`).
pub fn format_timestamp(offset: Duration) -> String {
    let secs = offset.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// Extract the frame at `offset` from `video_path` as a JPEG at `output_path`.
///
/// ffmpeg exits successfully without writing anything when the offset lies
/// past the end of the clip, so an empty or missing output counts as failure.
pub async fn extract_frame(
    ffmpeg_bin: &str,
    video_path: &Path,
    output_path: &Path,
    offset: Duration,
    timeout: Duration,
) -> Result<(), FfmpegError> {
    if !video_path.exists() {
        return Err(FfmpegError::VideoNotFound(
            video_path.to_string_lossy().to_string(),
        ));
    }

    let timestamp = format_timestamp(offset);
    let args: Vec<&std::ffi::OsStr> = vec![
        "-y".as_ref(),
        "-loglevel".as_ref(),
        "error".as_ref(),
        "-ss".as_ref(),
        timestamp.as_ref(),
        "-i".as_ref(),
        video_path.as_os_str(),
        "-vframes".as_ref(),
        "1".as_ref(),
        "-vf".as_ref(),
        SCALE_FILTER.as_ref(),
        "-q:v".as_ref(),
        "5".as_ref(),
        output_path.as_os_str(),
    ];

    run_tool(ffmpeg_bin, args, timeout).await?;

    match tokio::fs::metadata(output_path).await {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(FfmpegError::NoFrame { timestamp }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_zero_padded() {
        assert_eq!(format_timestamp(PRIMARY_FRAME_OFFSET), "00:00:01");
        assert_eq!(format_timestamp(FALLBACK_FRAME_OFFSET), "00:00:00");
        assert_eq!(format_timestamp(SWEEP_FRAME_OFFSET), "00:01:00");
        assert_eq!(format_timestamp(Duration::from_secs(3725)), "01:02:05");
    }

    #[tokio::test]
    async fn missing_video_is_rejected_before_spawning() {
        let dir = tempfile::tempdir().unwrap();
        let result = extract_frame(
            "ffmpeg",
            &dir.path().join("missing.mp4"),
            &dir.path().join("out.jpg"),
            PRIMARY_FRAME_OFFSET,
            Duration::from_secs(1),
        )
        .await;
        assert!(matches!(result, Err(FfmpegError::VideoNotFound(_))));
    }
}
