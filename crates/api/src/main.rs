use std::io::IsTerminal;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burrow_api::config::{RemoteBackend, ServerConfig};
use burrow_api::maintenance::MaintenanceMode;
use burrow_api::{background, engine, router, state, ws};
use burrow_core::local_store::LocalStore;
use burrow_core::remote::RemoteConnector;
use burrow_events::ProgressBus;
use burrow_pipeline::{CacheDirs, Pipeline, PipelineConfig};
use burrow_sftp::SftpConnector;
use burrow_worker::ToolConverter;

use state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "burrow_api=debug,burrow_pipeline=debug,burrow_worker=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Remote store ---
    let connector: Arc<dyn RemoteConnector> = match &config.remote {
        RemoteBackend::Sftp(sftp) => {
            tracing::info!(host = %sftp.host, port = sftp.port, "Using SFTP remote store");
            Arc::new(SftpConnector::new(sftp.clone()))
        }
        RemoteBackend::Local(root) => {
            tracing::info!(root = %root.display(), "Using local directory as remote store");
            Arc::new(LocalStore::new(root.clone()))
        }
    };

    // --- Pipeline (caches, placeholder, worker pool, download jobs) ---
    let bus = Arc::new(ProgressBus::default());
    let converter = Arc::new(ToolConverter::new(config.tools.clone(), config.tool_timeout));
    let pipeline = Pipeline::init(
        PipelineConfig {
            cache_dirs: CacheDirs {
                image_cache_dir: config.image_cache_dir.clone(),
                video_cache_dir: config.video_cache_dir.clone(),
                temp_dir: config.preview_temp_dir.clone(),
            },
            placeholder_image: config.placeholder_image.clone(),
            downloads_dir: config.downloads_dir.clone(),
            archive_timeout: config.archive_timeout,
            workers: config.conversion_workers,
        },
        connector,
        converter,
        Arc::clone(&bus),
    )
    .await
    .expect("Failed to initialise preview pipeline");
    tracing::info!(workers = pipeline.pool.size(), "Pipeline initialised");

    // --- WebSocket manager, heartbeat and progress relay ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));
    let relay_handle = tokio::spawn(engine::progress::run(
        bus.subscribe(),
        Arc::clone(&ws_manager),
    ));

    // --- App state ---
    let maintenance = Arc::new(MaintenanceMode::new(Arc::clone(&bus)));
    let state = AppState {
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        pipeline: pipeline.clone(),
        maintenance: Arc::clone(&maintenance),
    };
    let app = router::build_app_router(state, &config);

    // --- Startup thumbnail sweep ---
    let sweep_cancel = CancellationToken::new();
    let sweep_handle = config.precache_on_startup.then(|| {
        tokio::spawn(background::precache::run(
            pipeline.thumbnails.clone(),
            config.precache_root.clone(),
            sweep_cancel.clone(),
        ))
    });

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let notice = config.maintenance_notice;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            maintenance.begin(None);
            tokio::time::sleep(notice).await;
        })
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    sweep_cancel.cancel();
    if let Some(handle) = sweep_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    heartbeat_handle.abort();
    relay_handle.abort();
    tracing::info!("Heartbeat and progress relay stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination request: SIGINT, SIGTERM (on Unix) or a `stop`
/// line typed on an interactive console.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
        () = console_stop() => {
            tracing::info!("Received 'stop' on console, starting graceful shutdown");
        }
    }
}

/// Resolve when `stop` is entered on stdin. Never resolves when stdin is not
/// a terminal.
async fn console_stop() {
    if !std::io::stdin().is_terminal() {
        return std::future::pending().await;
    }

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().eq_ignore_ascii_case("stop") => return,
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => return std::future::pending().await,
        }
    }
}
