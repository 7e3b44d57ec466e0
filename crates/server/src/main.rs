use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vidqueue_core::{
    load_config, load_config_from_env, validate_config, Config, EventBus, FfmpegSupervisor,
    FfprobeInspector, Inspector, JobRunner, Orchestrator,
};
use vidqueue_server::api::{create_router, WsBroadcaster};
use vidqueue_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("vidqueue {} starting", VERSION);
    let config = read_config()?;
    validate_config(&config).context("Configuration validation failed")?;
    info!(
        "Configuration loaded (ffmpeg: {}, max_concurrent: {})",
        config.encoder.ffmpeg_path.display(),
        config.queue.max_concurrent
    );

    let runner = Arc::new(FfmpegSupervisor::new(config.encoder.clone()));
    if let Err(e) = runner.validate().await {
        // Jobs fail with spawn_failed until ffmpeg is installed
        warn!("FFmpeg check failed: {}", e);
    }
    let inspector: Arc<dyn Inspector> = Arc::new(FfprobeInspector::new(config.encoder.clone()));

    let bus = EventBus::new();
    let ws_broadcaster = WsBroadcaster::default();
    let _ws_subscription = ws_broadcaster.attach(&bus);

    let orchestrator = Orchestrator::new(config.queue.clone(), runner, bus);
    info!("Orchestrator started");

    let sweeper = config.queue.retention().map(|retention| {
        tokio::spawn(sweep_loop(
            orchestrator.clone(),
            retention,
            config.queue.sweep_interval(),
        ))
    });

    let state = Arc::new(AppState::new(
        config.clone(),
        orchestrator.clone(),
        inspector,
        ws_broadcaster,
    ));
    let app = create_router(state);

    let addr = config.server.bind_addr();
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if let Some(handle) = sweeper {
        handle.abort();
    }
    orchestrator.shutdown().await;
    info!("Orchestrator stopped");

    Ok(())
}

/// Reads the file named by `VIDQUEUE_CONFIG`, or the environment alone.
fn read_config() -> Result<Config> {
    match std::env::var("VIDQUEUE_CONFIG") {
        Ok(path) => {
            let path = PathBuf::from(path);
            info!("Loading configuration from {:?}", path);
            load_config(&path).with_context(|| format!("Failed to load config from {:?}", path))
        }
        Err(_) => {
            info!("VIDQUEUE_CONFIG not set, using defaults and environment");
            load_config_from_env().context("Failed to load config from environment")
        }
    }
}

/// Periodically drops terminal records older than `retention`.
async fn sweep_loop(orchestrator: Orchestrator, retention: Duration, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick fires immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match orchestrator.clear_older_than(retention).await {
            Ok(0) => {}
            Ok(removed) => info!("Swept {} finished job records", removed),
            Err(e) => {
                warn!("Sweep stopped: {}", e);
                break;
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
