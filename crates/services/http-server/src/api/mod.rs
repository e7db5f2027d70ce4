//! HTTP API for HomeCam
//!
//! - `GET /camera/video_feed` - Live multipart feed (stream auth)
//! - `GET /camera/snapshot[/:format]` - Single frame (stream auth)
//! - `GET /camera/status`, `GET /camera/formats` - Camera info
//! - `POST /camera/stream/start`, `POST /camera/stream/stop` - Lifecycle
//! - `POST /auth/login`, `POST /auth/login/json` - Admin login
//! - `POST /auth/logout`, `GET /auth/info` - Session info
//! - `POST /auth/streaming-token` - Mint a URL-embeddable token
//! - `GET /health`, `GET /metrics`

pub mod auth;
pub mod camera;
pub mod error;
pub mod extract;

use axum::{
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use homecam_core::auth::TokenVerifier;
use homecam_core::capture::CaptureManager;
use homecam_core::metrics::{Metrics, MetricsSnapshot};
use homecam_core::{Config, Error};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use self::error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// The one camera this process serves
    pub camera: Arc<CaptureManager>,
    /// Token verification pipeline
    pub verifier: Arc<TokenVerifier>,
    /// Service configuration
    pub config: Arc<Config>,
    /// Process metrics
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        camera: Arc<CaptureManager>,
        verifier: Arc<TokenVerifier>,
        config: Arc<Config>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            camera,
            verifier,
            config,
            metrics,
        }
    }
}

/// Generic acknowledgement body
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub message: &'static str,
    pub version: &'static str,
}

/// Run blocking camera work off the async workers
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> homecam_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("blocking task failed: {}", e)))?
        .map_err(ApiError::from)
}

/// Build the HTTP API router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origins);
    let static_dir = state.config.server.static_dir.clone();

    let router = Router::new()
        // Camera
        .route("/camera/video_feed", get(camera::video_feed))
        .route("/camera/snapshot", get(camera::snapshot))
        .route("/camera/snapshot/:format", get(camera::snapshot_with_format))
        .route("/camera/status", get(camera::camera_status))
        .route("/camera/stream/start", post(camera::start_stream))
        .route("/camera/stream/stop", post(camera::stop_stream))
        .route("/camera/formats", get(camera::supported_formats))
        // Auth
        .route("/auth/login", post(auth::login_form))
        .route("/auth/login/json", post(auth::login_json))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/info", get(auth::auth_info))
        .route("/auth/streaming-token", post(auth::streaming_token))
        // Health and metrics
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler));

    // Viewer page, if configured
    let router = match static_dir {
        Some(dir) => router.fallback_service(
            ServeDir::new(&dir).fallback(ServeFile::new(format!("{}/index.html", dir))),
        ),
        None => router,
    };

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(parsed))
    }
}

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "healthy",
        message: "HomeCam API is running",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Metrics endpoint
async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
