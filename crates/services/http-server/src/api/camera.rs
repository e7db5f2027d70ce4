//! Camera endpoints
//!
//! The feed and snapshot endpoints take stream auth (query or header token,
//! identity or streaming). Control endpoints take identity auth.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Path, State},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
    Json,
};
use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::Stream;
use homecam_core::capture::{
    CaptureManager, CaptureState, EncodedFrame, FrameFormat, StartOutcome, StopOutcome,
    SUPPORTED_FORMATS,
};
use homecam_core::metrics::Metrics;
use serde::Serialize;

use super::error::ApiError;
use super::extract::{IdentityUser, StreamUser};
use super::{run_blocking, AppState, MessageResponse};

/// Multipart boundary between frames
pub const BOUNDARY: &str = "frame";

/// Back-off when the frame buffer is empty
const POLL_BACKOFF: Duration = Duration::from_millis(10);

/// Camera status response
#[derive(Debug, Serialize)]
pub struct CameraStatusResponse {
    pub success: bool,
    pub device_id: u32,
    pub status: CaptureState,
    pub is_streaming: bool,
    pub frame_rate: Option<u32>,
    pub resolution: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Supported formats response
#[derive(Debug, Serialize)]
pub struct CameraFormatsResponse {
    pub success: bool,
    pub formats: Vec<FrameFormat>,
    pub default_format: FrameFormat,
}

/// Live feed as `multipart/x-mixed-replace`
///
/// GET /camera/video_feed
pub async fn video_feed(
    State(state): State<AppState>,
    StreamUser(user): StreamUser,
) -> Result<Response, ApiError> {
    let camera = state.camera.clone();
    let outcome = run_blocking(move || camera.start_streaming()).await?;
    tracing::info!(user_id = %user.user_id, started = outcome == StartOutcome::Started, "Viewer joined video feed");

    let body = Body::from_stream(frame_stream(state.camera.clone(), state.metrics.clone()));
    Ok((
        [
            (
                CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={}", BOUNDARY),
            ),
            (CACHE_CONTROL, "no-cache, no-store".to_string()),
        ],
        body,
    )
        .into_response())
}

/// Snapshot in the default format
///
/// GET /camera/snapshot
pub async fn snapshot(
    State(state): State<AppState>,
    StreamUser(_user): StreamUser,
) -> Result<Response, ApiError> {
    take_snapshot(&state, FrameFormat::default()).await
}

/// Snapshot in a caller-chosen format
///
/// GET /camera/snapshot/:format
pub async fn snapshot_with_format(
    State(state): State<AppState>,
    Path(format): Path<String>,
    StreamUser(_user): StreamUser,
) -> Result<Response, ApiError> {
    let format = SUPPORTED_FORMATS
        .into_iter()
        .find(|f| f.as_str() == format)
        .ok_or_else(|| ApiError::BadRequest("Unsupported format. Use: jpeg, webp, or png".to_string()))?;
    take_snapshot(&state, format).await
}

async fn take_snapshot(state: &AppState, format: FrameFormat) -> Result<Response, ApiError> {
    let camera = state.camera.clone();
    let frame = run_blocking(move || camera.snapshot(format)).await?;

    Ok(([(CONTENT_TYPE, frame.format.mime_type())], frame.data).into_response())
}

/// GET /camera/status
pub async fn camera_status(
    State(state): State<AppState>,
    IdentityUser(_user): IdentityUser,
) -> Result<Json<CameraStatusResponse>, ApiError> {
    let camera = state.camera.clone();
    let status = run_blocking(move || Ok(camera.status())).await?;
    Ok(Json(CameraStatusResponse {
        success: true,
        device_id: status.device_id,
        status: status.state,
        is_streaming: status.is_streaming,
        frame_rate: status.frame_rate,
        resolution: status.resolution,
        timestamp: Utc::now(),
    }))
}

/// POST /camera/stream/start
pub async fn start_stream(
    State(state): State<AppState>,
    IdentityUser(user): IdentityUser,
) -> Result<Json<MessageResponse>, ApiError> {
    let camera = state.camera.clone();
    let outcome = run_blocking(move || camera.start_streaming()).await?;
    tracing::info!(user_id = %user.user_id, ?outcome, "Stream start requested");

    Ok(Json(MessageResponse::new(match outcome {
        StartOutcome::Started => "Streaming started successfully",
        StartOutcome::AlreadyStreaming => "Streaming is already active",
    })))
}

/// Stop streaming and release the device
///
/// POST /camera/stream/stop
pub async fn stop_stream(
    State(state): State<AppState>,
    IdentityUser(user): IdentityUser,
) -> Result<Json<MessageResponse>, ApiError> {
    let camera = state.camera.clone();
    let outcome = run_blocking(move || Ok(camera.release())).await?;
    tracing::info!(user_id = %user.user_id, ?outcome, "Stream stop requested");

    Ok(Json(MessageResponse::new(match outcome {
        StopOutcome::Stopped => "Streaming stopped and camera released successfully",
        StopOutcome::NotStreaming => "Streaming was already inactive, camera released",
    })))
}

/// GET /camera/formats
pub async fn supported_formats(IdentityUser(_user): IdentityUser) -> Json<CameraFormatsResponse> {
    Json(CameraFormatsResponse {
        success: true,
        formats: SUPPORTED_FORMATS.to_vec(),
        default_format: FrameFormat::default(),
    })
}

/// One multipart part: boundary, headers, payload
pub fn multipart_chunk(frame: &EncodedFrame) -> Bytes {
    let header = format!(
        "--{}\r\nContent-Type: {}\r\n\r\n",
        BOUNDARY,
        frame.format.mime_type()
    );
    let mut chunk = BytesMut::with_capacity(header.len() + frame.len() + 2);
    chunk.put_slice(header.as_bytes());
    chunk.put_slice(&frame.data);
    chunk.put_slice(b"\r\n");
    chunk.freeze()
}

/// Tracks one connected viewer for the lifetime of its stream
struct ViewerGuard(Arc<Metrics>);

impl ViewerGuard {
    fn new(metrics: Arc<Metrics>) -> Self {
        metrics.viewer_connected();
        Self(metrics)
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.0.viewer_disconnected();
        tracing::debug!("Viewer left video feed");
    }
}

/// Poll the frame buffer until streaming stops or the client goes away
fn frame_stream(
    camera: Arc<CaptureManager>,
    metrics: Arc<Metrics>,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    async_stream::stream! {
        let _viewer = ViewerGuard::new(metrics);

        while camera.is_streaming() {
            match camera.try_take_frame() {
                Some(frame) => {
                    yield Ok::<_, Infallible>(multipart_chunk(&frame));
                }
                None => tokio::time::sleep(POLL_BACKOFF).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_chunk_layout() {
        let frame = EncodedFrame::new(&b"IMG"[..], FrameFormat::Jpeg);
        let chunk = multipart_chunk(&frame);
        assert_eq!(&chunk[..], b"--frame\r\nContent-Type: image/jpeg\r\n\r\nIMG\r\n");
    }
}
