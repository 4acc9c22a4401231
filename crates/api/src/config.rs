use std::path::PathBuf;
use std::time::Duration;

use burrow_sftp::SftpConfig;
use burrow_worker::{ConversionPool, ToolPaths};

/// Which remote store the service browses.
#[derive(Debug, Clone)]
pub enum RemoteBackend {
    Sftp(SftpConfig),
    /// A local directory standing in for the remote root (development).
    Local(PathBuf),
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development except
/// the SFTP credentials, which are required when `REMOTE_BACKEND=sftp`.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8087`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long clients get to see the maintenance notice before shutdown.
    pub maintenance_notice: Duration,
    pub remote: RemoteBackend,
    pub image_cache_dir: PathBuf,
    pub video_cache_dir: PathBuf,
    pub downloads_dir: PathBuf,
    /// Scratch space for preview sources staged from the remote store.
    pub preview_temp_dir: PathBuf,
    pub placeholder_image: Option<PathBuf>,
    pub conversion_workers: usize,
    pub tool_timeout: Duration,
    pub archive_timeout: Duration,
    pub tools: ToolPaths,
    pub precache_on_startup: bool,
    pub precache_root: String,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                   |
    /// |-----------------------------|---------------------------|
    /// | `HOST`                      | `0.0.0.0`                 |
    /// | `PORT`                      | `8087`                    |
    /// | `CORS_ORIGINS`              | `http://localhost:5173`   |
    /// | `REQUEST_TIMEOUT_SECS`      | `30`                      |
    /// | `MAINTENANCE_NOTICE_MS`     | `1500`                    |
    /// | `REMOTE_BACKEND`            | `sftp` (or `local`)       |
    /// | `LOCAL_REMOTE_ROOT`         | `./remote`                |
    /// | `SFTP_HOST`                 | required for `sftp`       |
    /// | `SFTP_PORT`                 | `22`                      |
    /// | `SFTP_USERNAME`             | required for `sftp`       |
    /// | `SFTP_PASSWORD`             | required for `sftp`       |
    /// | `SFTP_CONNECT_TIMEOUT_SECS` | `600`                     |
    /// | `SFTP_KEEPALIVE_SECS`       | `10`                      |
    /// | `IMAGE_CACHE_DIR`           | `$TMP/image_cache`        |
    /// | `VIDEO_CACHE_DIR`           | `$TMP/video_cache`        |
    /// | `DOWNLOADS_DIR`             | `$TMP/burrow_downloads`   |
    /// | `PLACEHOLDER_IMAGE`         | unset (generated)         |
    /// | `CONVERSION_WORKERS`        | available parallelism     |
    /// | `TOOL_TIMEOUT_SECS`         | `120`                     |
    /// | `ARCHIVE_TIMEOUT_SECS`      | `3600`                    |
    /// | `FFMPEG_BIN`                | `ffmpeg`                  |
    /// | `HEIF_CONVERT_BIN`          | `heif-convert`            |
    /// | `PDFTOPPM_BIN`              | `pdftoppm`                |
    /// | `PRECACHE_ON_STARTUP`       | `true`                    |
    /// | `PRECACHE_ROOT`             | `/`                       |
    ///
    /// Panics on malformed values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        let host = env_or("HOST", "0.0.0.0");
        let port: u16 = env_or("PORT", "8087")
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = parse_u64("REQUEST_TIMEOUT_SECS", 30);
        let maintenance_notice = Duration::from_millis(parse_u64("MAINTENANCE_NOTICE_MS", 1500));

        let remote = match env_or("REMOTE_BACKEND", "sftp").as_str() {
            "sftp" => RemoteBackend::Sftp(SftpConfig {
                host: required("SFTP_HOST"),
                port: env_or("SFTP_PORT", "22")
                    .parse()
                    .expect("SFTP_PORT must be a valid u16"),
                username: required("SFTP_USERNAME"),
                password: required("SFTP_PASSWORD"),
                connect_timeout: Duration::from_secs(parse_u64("SFTP_CONNECT_TIMEOUT_SECS", 600)),
                keepalive: Duration::from_secs(parse_u64("SFTP_KEEPALIVE_SECS", 10)),
            }),
            "local" => RemoteBackend::Local(PathBuf::from(env_or("LOCAL_REMOTE_ROOT", "./remote"))),
            other => panic!("REMOTE_BACKEND must be 'sftp' or 'local', got '{other}'"),
        };

        let tmp = std::env::temp_dir();
        let dir = |key: &str, default: &str| {
            std::env::var(key)
                .map(PathBuf::from)
                .unwrap_or_else(|_| tmp.join(default))
        };

        let conversion_workers = match std::env::var("CONVERSION_WORKERS") {
            Ok(v) => v
                .parse()
                .expect("CONVERSION_WORKERS must be a valid usize"),
            Err(_) => ConversionPool::default_size(),
        };

        let defaults = ToolPaths::default();
        let tools = ToolPaths {
            ffmpeg: std::env::var("FFMPEG_BIN").unwrap_or(defaults.ffmpeg),
            heif_convert: std::env::var("HEIF_CONVERT_BIN").unwrap_or(defaults.heif_convert),
            pdftoppm: std::env::var("PDFTOPPM_BIN").unwrap_or(defaults.pdftoppm),
        };

        let precache_on_startup = env_or("PRECACHE_ON_STARTUP", "true")
            .parse()
            .expect("PRECACHE_ON_STARTUP must be true or false");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            maintenance_notice,
            remote,
            image_cache_dir: dir("IMAGE_CACHE_DIR", "image_cache"),
            video_cache_dir: dir("VIDEO_CACHE_DIR", "video_cache"),
            downloads_dir: dir("DOWNLOADS_DIR", "burrow_downloads"),
            preview_temp_dir: tmp.join("burrow_preview"),
            placeholder_image: std::env::var("PLACEHOLDER_IMAGE").ok().map(PathBuf::from),
            conversion_workers,
            tool_timeout: Duration::from_secs(parse_u64("TOOL_TIMEOUT_SECS", 120)),
            archive_timeout: Duration::from_secs(parse_u64("ARCHIVE_TIMEOUT_SECS", 3600)),
            tools,
            precache_on_startup,
            precache_root: env_or("PRECACHE_ROOT", "/"),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}

fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(v) => v
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid u64: {e}")),
        Err(_) => default,
    }
}

fn required(key: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| panic!("{key} must be set when REMOTE_BACKEND=sftp"))
}
