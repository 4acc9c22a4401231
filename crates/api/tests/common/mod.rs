#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use burrow_api::config::{RemoteBackend, ServerConfig};
use burrow_api::maintenance::MaintenanceMode;
use burrow_api::router::build_app_router;
use burrow_api::state::AppState;
use burrow_api::ws::WsManager;
use burrow_api::engine;
use burrow_core::local_store::LocalStore;
use burrow_events::ProgressBus;
use burrow_pipeline::{CacheDirs, Pipeline, PipelineConfig};
use burrow_worker::{ConversionError, ConversionTask, Converter, ToolPaths};

/// Converter that writes a fixed JPEG stand-in, failing for sources whose
/// name starts with `broken`.
#[derive(Default)]
pub struct FakeConverter {
    pub calls: AtomicUsize,
}

impl FakeConverter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Converter for FakeConverter {
    async fn convert(&self, task: &ConversionTask) -> Result<(), ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if task.cache_key.starts_with("broken") {
            return Err(ConversionError::Timeout(Duration::from_secs(1)));
        }
        tokio::fs::write(&task.output, b"fake-jpeg").await?;
        Ok(())
    }
}

/// A running test application backed by temp directories.
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub converter: Arc<FakeConverter>,
    /// Root of the local directory standing in for the SFTP server.
    pub remote: TempDir,
    pub local: TempDir,
}

impl TestApp {
    pub fn remote_path(&self, relative: &str) -> std::path::PathBuf {
        self.remote.path().join(relative)
    }

    pub fn write_remote(&self, relative: &str, contents: &[u8]) {
        let path = self.remote_path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }
}

/// Build a test `ServerConfig` rooted at the given directories.
pub fn test_config(remote: &Path, local: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        maintenance_notice: Duration::from_millis(10),
        remote: RemoteBackend::Local(remote.to_path_buf()),
        image_cache_dir: local.join("image_cache"),
        video_cache_dir: local.join("video_cache"),
        downloads_dir: local.join("downloads"),
        preview_temp_dir: local.join("preview_tmp"),
        placeholder_image: None,
        conversion_workers: 2,
        tool_timeout: Duration::from_secs(5),
        archive_timeout: Duration::from_secs(60),
        tools: ToolPaths::default(),
        precache_on_startup: false,
        precache_root: "/".to_string(),
    }
}

/// Build the full application the way `main.rs` does, with a local
/// directory as the remote store and a fake converter.
///
/// The progress relay is running, so WebSocket observers receive bus
/// messages.
pub async fn build_test_app() -> TestApp {
    let remote = tempfile::tempdir().unwrap();
    let local = tempfile::tempdir().unwrap();
    let config = test_config(remote.path(), local.path());

    let bus = Arc::new(ProgressBus::default());
    let converter = Arc::new(FakeConverter::default());
    let pipeline = Pipeline::init(
        PipelineConfig {
            cache_dirs: CacheDirs {
                image_cache_dir: config.image_cache_dir.clone(),
                video_cache_dir: config.video_cache_dir.clone(),
                temp_dir: config.preview_temp_dir.clone(),
            },
            placeholder_image: None,
            downloads_dir: config.downloads_dir.clone(),
            archive_timeout: config.archive_timeout,
            workers: config.conversion_workers,
        },
        Arc::new(LocalStore::new(remote.path())),
        Arc::clone(&converter) as Arc<dyn Converter>,
        Arc::clone(&bus),
    )
    .await
    .unwrap();

    let ws_manager = Arc::new(WsManager::new());
    tokio::spawn(engine::progress::run(bus.subscribe(), Arc::clone(&ws_manager)));

    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager,
        pipeline,
        maintenance: Arc::new(MaintenanceMode::new(bus)),
    };
    let app = build_app_router(state.clone(), &config);

    TestApp {
        app,
        state,
        converter,
        remote,
        local,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// POST a multipart form. `parts` are `(field name, file name, contents)`;
/// a `None` file name makes a plain text field.
pub async fn post_multipart(
    app: Router,
    uri: &str,
    parts: &[(&str, Option<&str>, &str)],
) -> Response<Body> {
    const BOUNDARY: &str = "burrow-test-boundary";
    let mut body = Vec::new();
    for (name, file_name, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file_name {
            Some(file_name) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    app.oneshot(
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
