//! Virtual Detents knob controller
//!
//! Runs the detent control loop against the knob and serves displays over
//! WebSocket.

use virtual_detents::{bus, config, peer};

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "virtual_detents=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Starting Virtual Detents peer v{} ({})",
        env!("DETENTS_VERSION"),
        env!("DETENTS_GIT_SHA")
    );

    // Load configuration
    let config = config::load_config()?;
    tracing::info!(
        "Configuration loaded, port: {}, detents: {}",
        config.peer.port,
        config.peer.detents
    );

    let bus = bus::create_bus();
    let settings = peer::PeerSettings::from(&config.peer);
    let knob = Arc::new(peer::SimulatedKnob::new(settings.tick));
    let shutdown = CancellationToken::new();

    let (state, control) = peer::spawn(settings, knob, bus.clone(), shutdown.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.peer.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        server_shutdown.cancel();
    });

    peer::serve(listener, state, shutdown.clone()).await?;

    // Server may also stop on its own; make sure the loop follows
    shutdown.cancel();
    tracing::info!("Stopping control loop...");
    match control.await {
        Ok(result) => result?,
        Err(e) => tracing::warn!("Control loop task failed: {}", e),
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
