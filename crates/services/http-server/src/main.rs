//! HomeCam server binary
//!
//! # Usage
//!
//! ```bash
//! # Defaults plus HOMECAM_* environment variables
//! homecam-server
//!
//! # From a TOML file
//! homecam-server --config homecam.toml
//!
//! # With logging
//! RUST_LOG=debug homecam-server
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use homecam_core::Config;
use homecam_http_server::{build_router, build_state};

#[derive(Parser, Debug)]
#[command(name = "homecam-server")]
#[command(about = "Authenticated live camera feed over HTTP", long_about = None)]
#[command(version)]
struct Args {
    /// TOML configuration file (falls back to environment variables when absent)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind host
    #[arg(long)]
    host: Option<String>,

    /// Override the HTTP port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    tracing::info!("Starting HomeCam server...");

    // Load configuration
    let mut config = Config::load(args.config.as_ref()).context("failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.http_port = port;
    }

    tracing::info!(
        device_id = config.camera.device_id,
        resolution = %config.camera.resolution(),
        fps = config.camera.fps,
        backend = ?config.camera.backend,
        "Camera configuration"
    );
    warn_about_auth(&config);

    let bind_addr = format!("{}:{}", config.server.host, config.server.http_port);
    let state = build_state(config).context("failed to initialize services")?;
    let camera = state.camera.clone();

    // Build HTTP router
    let router = build_router(state);

    // Start HTTP server
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    tracing::info!("HTTP server listening on {}", bind_addr);

    let shutdown_camera = camera.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, initiating graceful shutdown...");
            // Open feeds end once streaming stops
            let _ = tokio::task::spawn_blocking(move || shutdown_camera.stop_streaming()).await;
        })
        .await?;

    // Turn the camera off before exiting
    tokio::task::spawn_blocking(move || camera.release())
        .await
        .context("camera release task failed")?;

    tracing::info!("HomeCam server shutdown complete");
    Ok(())
}

fn warn_about_auth(config: &Config) {
    let auth = &config.auth;

    if auth.development_mode {
        tracing::warn!("Development mode: admin and development bypass tokens are ACCEPTED");
    } else if auth.admin_bootstrap {
        tracing::warn!("Admin bootstrap mode: the admin bypass token is ACCEPTED");
    }

    if auth.provider_root.is_none() && auth.trusted_issuers.is_empty() {
        if auth.development_mode {
            tracing::warn!(
                "No identity provider root or trusted issuers configured; key sets are located from unverified issuer claims"
            );
        } else {
            tracing::warn!(
                "No identity provider root or trusted issuers configured; identity tokens will be rejected"
            );
        }
    }

    if auth.streaming_secret == homecam_core::config::AuthConfig::default().streaming_secret {
        tracing::warn!("Streaming tokens are signed with the built-in default secret; set HOMECAM_STREAMING_SECRET");
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
