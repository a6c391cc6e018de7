use std::collections::BTreeMap;
use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tts_core::{EngineHandle, PiperEngine};

use server::config::ServerConfig;
use server::{build_router, metrics, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let _ = dotenv::dotenv();

    async_main().await
}

async fn async_main() -> anyhow::Result<()> {
    info!("Starting streaming TTS server...");
    metrics::mark_start();

    let config = ServerConfig::from_env();

    info!("Loading TTS voices from {}...", config.model_map);
    let piper = PiperEngine::from_map_file(&config.model_map).unwrap_or_else(|e| {
        warn!("Could not load {}: {e:#}, using empty map.", config.model_map);
        PiperEngine::new(BTreeMap::new())
    });
    info!("Configured {} TTS voices", piper.voices().len());
    let engine = EngineHandle::initialize(piper);

    info!(
        "Server configuration loaded: port={}, max_segment_length={}, chunk_size={}, ws_idle_timeout={}s",
        config.port, config.max_segment_length, config.chunk_size, config.ws_idle_timeout_secs
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let app = build_router(AppState::new(engine.clone(), config));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!("Failed to bind {addr}: {e}. Try a different PORT.")
    })?;

    info!("Server listening on http://{addr}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Waits for an in-flight request to release the engine.
    engine.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
