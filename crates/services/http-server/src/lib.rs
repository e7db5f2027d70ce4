//! HomeCam HTTP server
//!
//! axum front end over `homecam-core`: authenticated live feed, snapshots,
//! camera lifecycle control and token endpoints.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                      homecam-http-server                      │
//! ├───────────────────────────────────────────────────────────────┤
//! │  request ─▶ IdentityUser / StreamUser extractor               │
//! │                 │ TokenVerifier                               │
//! │                 ▼                                             │
//! │  handler ─▶ spawn_blocking(CaptureManager op)                 │
//! │                 │                                             │
//! │  video_feed ◀── FrameBuffer::try_take (10 ms back-off)        │
//! │      └─▶ multipart/x-mixed-replace; boundary=frame            │
//! └───────────────────────────────────────────────────────────────┘
//! ```

pub mod api;

pub use api::{build_router, AppState};

use std::sync::Arc;

use homecam_core::auth::TokenVerifier;
use homecam_core::capture::{opener_for, CaptureManager};
use homecam_core::metrics::global_metrics;
use homecam_core::Config;

/// Wire up the camera, verifier and metrics for `config`
///
/// The camera is not opened until the first request needs it.
pub fn build_state(config: Config) -> homecam_core::Result<AppState> {
    let opener = opener_for(config.camera.backend)?;
    let metrics = global_metrics();
    let camera = CaptureManager::new(config.camera.clone(), opener).with_metrics(metrics.clone());
    let verifier = TokenVerifier::from_config(config.auth.clone())?;

    Ok(AppState::new(
        Arc::new(camera),
        Arc::new(verifier),
        Arc::new(config),
        metrics,
    ))
}
