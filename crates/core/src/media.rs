//! Classification of remote files into preview kinds.

use serde::Serialize;

use crate::paths;

/// Longest edge bounds for generated thumbnails.
pub const THUMBNAIL_MAX_WIDTH: u32 = 800;
pub const THUMBNAIL_MAX_HEIGHT: u32 = 600;

/// Extension of every cached thumbnail.
pub const THUMBNAIL_EXTENSION: &str = "jpg";

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];
const HEIC_EXTENSIONS: &[&str] = &["heic"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "webm", "mkv"];
const PDF_EXTENSIONS: &[&str] = &["pdf"];

/// How a file's thumbnail is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewKind {
    Image,
    Heic,
    Video,
    Pdf,
}

impl PreviewKind {
    /// Detect the kind from the file extension. `None` means the file has no
    /// preview and is served as-is.
    pub fn detect(path: &str) -> Option<Self> {
        let ext = paths::extension(path)?;
        let ext = ext.as_str();
        if IMAGE_EXTENSIONS.contains(&ext) {
            Some(PreviewKind::Image)
        } else if HEIC_EXTENSIONS.contains(&ext) {
            Some(PreviewKind::Heic)
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            Some(PreviewKind::Video)
        } else if PDF_EXTENSIONS.contains(&ext) {
            Some(PreviewKind::Pdf)
        } else {
            None
        }
    }

    /// Image and HEIC sources are small enough to buffer in memory; video and
    /// PDF sources are staged to a temp file.
    pub fn buffers_in_memory(self) -> bool {
        matches!(self, PreviewKind::Image | PreviewKind::Heic)
    }
}

/// Cache file name for a remote path: `basename + ".jpg"`.
///
/// Two remote files with the same basename share an entry; the cache is
/// keyed by name only.
pub fn cache_file_name(remote_path: &str) -> String {
    format!("{}.{THUMBNAIL_EXTENSION}", paths::basename(remote_path))
}

/// Guess a content type for raw file streaming.
pub fn content_type_for(path: &str) -> &'static str {
    match paths::extension(path).as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("avi") => "video/x-msvideo",
        Some("pdf") => "application/pdf",
        Some("txt" | "log" | "properties" | "yml" | "yaml" | "toml") => "text/plain; charset=utf-8",
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}
