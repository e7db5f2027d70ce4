//! Camera lifecycle owner
//!
//! `CaptureManager` owns the device handle and the frame buffer for one
//! camera. Two locks are involved:
//!
//! - the lifecycle lock serializes acquire/start/stop/release, so concurrent
//!   callers observe one transition and at most one capture loop exists;
//! - the device lock guards the handle and state, held for a single read or a
//!   single state change and never across encoding.
//!
//! Lock order is always lifecycle, then device.
//!
//! All methods block. Async callers go through `spawn_blocking`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

use super::buffer::FrameBuffer;
use super::device::{candidate_indices, DeviceHandle, DeviceOpener};
use super::frame::{encode_with_fallback, EncodedFrame, FrameEncoder, FrameFormat, ImageCodec};
use super::worker::{LoopSettings, Worker};
use crate::config::CameraConfig;
use crate::error::{Error, Result};
use crate::metrics::{global_metrics, Metrics};

/// Format and quality used by the background loop
const STREAM_FORMAT: FrameFormat = FrameFormat::Webp;

/// Camera lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureState {
    Uninitialized,
    Active,
    Streaming,
    Released,
    Error,
}

impl CaptureState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureState::Uninitialized => "uninitialized",
            CaptureState::Active => "active",
            CaptureState::Streaming => "streaming",
            CaptureState::Released => "released",
            CaptureState::Error => "error",
        }
    }

    fn is_open(&self) -> bool {
        matches!(self, CaptureState::Active | CaptureState::Streaming)
    }
}

impl std::fmt::Display for CaptureState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the camera lifecycle
#[derive(Debug, Clone, Serialize)]
pub struct CaptureStatus {
    pub device_id: u32,
    pub state: CaptureState,
    pub is_streaming: bool,
    pub frame_rate: Option<u32>,
    pub resolution: Option<String>,
}

pub(crate) struct DeviceSlot {
    pub handle: Option<DeviceHandle>,
    pub state: CaptureState,
    pub device_id: u32,
}

/// State shared with the capture loop
pub(crate) struct Shared {
    pub device: Mutex<DeviceSlot>,
    pub streaming: AtomicBool,
    /// Bumped by every start and stop; a loop only acts for its own session
    pub generation: AtomicU64,
    pub buffer: FrameBuffer,
}

impl Shared {
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

/// Result of `start_streaming`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyStreaming,
}

/// Result of `stop_streaming`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotStreaming,
}

/// Owns one camera: device handle, frame buffer, and capture loop
pub struct CaptureManager {
    config: CameraConfig,
    opener: Arc<dyn DeviceOpener>,
    encoder: Arc<dyn FrameEncoder>,
    metrics: Arc<Metrics>,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl CaptureManager {
    /// Create a manager; no device is opened until first use
    pub fn new(config: CameraConfig, opener: Arc<dyn DeviceOpener>) -> Self {
        Self::with_encoder(config, opener, Arc::new(ImageCodec))
    }

    pub fn with_encoder(
        config: CameraConfig,
        opener: Arc<dyn DeviceOpener>,
        encoder: Arc<dyn FrameEncoder>,
    ) -> Self {
        let shared = Arc::new(Shared {
            device: Mutex::new(DeviceSlot {
                handle: None,
                state: CaptureState::Uninitialized,
                device_id: config.device_id,
            }),
            streaming: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            buffer: FrameBuffer::new(config.buffer_capacity),
        });

        Self {
            config,
            opener,
            encoder,
            metrics: global_metrics(),
            shared,
            worker: Mutex::new(None),
        }
    }

    /// Use a dedicated metrics collector instead of the process-wide one
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    /// Open the first working device among `[preferred, 0, 1, 2]`
    ///
    /// No-op when a device is already open.
    pub fn acquire(&self, preferred: u32) -> Result<()> {
        let _lifecycle = self.worker.lock();
        self.acquire_locked(preferred)
    }

    fn acquire_locked(&self, preferred: u32) -> Result<()> {
        let mut slot = self.shared.device.lock();
        if slot.handle.is_some() && slot.state.is_open() {
            return Ok(());
        }
        // Whatever is left from a failed session goes first
        slot.handle = None;

        let candidates = candidate_indices(preferred);
        let mut last_error = None;

        for &index in &candidates {
            let mut device = match self.opener.open(index) {
                Ok(device) => device,
                Err(e) => {
                    tracing::debug!(device_id = index, error = %e, "Device did not open");
                    last_error = Some(e);
                    continue;
                }
            };

            let test_frame = match device.read_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(device_id = index, error = %e, "Device opened but test read failed");
                    last_error = Some(e);
                    continue;
                }
            };

            let (width, height) = match device.configure(self.config.width, self.config.height, self.config.fps) {
                Ok(()) => (self.config.width, self.config.height),
                Err(e) => {
                    tracing::warn!(device_id = index, error = %e, "Keeping device defaults");
                    (test_frame.width, test_frame.height)
                }
            };

            tracing::info!(
                device_id = index,
                backend = self.opener.name(),
                resolution = %format!("{}x{}", width, height),
                fps = self.config.fps,
                "Camera acquired"
            );

            slot.handle = Some(DeviceHandle::new(index, width, height, self.config.fps, device));
            slot.device_id = index;
            slot.state = CaptureState::Active;
            return Ok(());
        }

        slot.state = CaptureState::Error;
        let detail = last_error.map(|e| format!(": {}", e)).unwrap_or_default();
        Err(Error::CameraUnavailable(format!(
            "no working camera found (tried devices {:?}){}",
            candidates, detail
        )))
    }

    /// Ensure the background capture loop is running
    ///
    /// Re-acquires the device after a release or device loss.
    pub fn start_streaming(&self) -> Result<StartOutcome> {
        let mut worker = self.worker.lock();

        if let Some(running) = worker.as_ref() {
            if self.shared.streaming.load(Ordering::SeqCst) && !running.is_finished() {
                return Ok(StartOutcome::AlreadyStreaming);
            }
        }
        // Reap a loop that exited on its own
        if let Some(finished) = worker.take() {
            finished.stop(self.stop_timeout());
        }

        let preferred = self.shared.device.lock().device_id;
        self.acquire_locked(preferred)?;

        self.shared.buffer.clear();
        let generation = {
            let mut slot = self.shared.device.lock();
            self.shared.streaming.store(true, Ordering::SeqCst);
            slot.state = CaptureState::Streaming;
            self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let settings = LoopSettings {
            fps: self.config.fps,
            format: STREAM_FORMAT,
            quality: self.config.stream_quality,
        };
        match Worker::spawn(
            self.shared.clone(),
            self.encoder.clone(),
            self.metrics.clone(),
            settings,
            generation,
        ) {
            Ok(spawned) => {
                *worker = Some(spawned);
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                let mut slot = self.shared.device.lock();
                self.shared.streaming.store(false, Ordering::SeqCst);
                slot.state = CaptureState::Active;
                Err(e)
            }
        }
    }

    /// Stop the capture loop, waiting a bounded time for it to exit
    pub fn stop_streaming(&self) -> StopOutcome {
        let mut worker = self.worker.lock();
        self.stop_locked(&mut worker)
    }

    fn stop_locked(&self, worker: &mut Option<Worker>) -> StopOutcome {
        // A loop left behind by a timed-out join must not touch later sessions
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        let was_streaming = self.shared.streaming.swap(false, Ordering::SeqCst);

        if let Some(running) = worker.take() {
            running.stop(self.stop_timeout());
        }

        let mut slot = self.shared.device.lock();
        if slot.state == CaptureState::Streaming {
            slot.state = CaptureState::Active;
        }
        drop(slot);
        self.shared.buffer.clear();

        if was_streaming {
            tracing::info!("Streaming stopped");
            StopOutcome::Stopped
        } else {
            StopOutcome::NotStreaming
        }
    }

    /// Stop streaming and close the device; the next access re-acquires
    ///
    /// Reports whether this call was the one that ended streaming.
    pub fn release(&self) -> StopOutcome {
        let mut worker = self.worker.lock();
        let outcome = self.stop_locked(&mut worker);

        let mut slot = self.shared.device.lock();
        if slot.handle.take().is_some() {
            tracing::info!(device_id = slot.device_id, "Camera released");
        }
        if slot.state != CaptureState::Uninitialized {
            slot.state = CaptureState::Released;
        }
        outcome
    }

    /// Read and encode one frame synchronously
    pub fn capture_frame(&self, format: FrameFormat, quality: u8) -> Result<EncodedFrame> {
        let raw = {
            let mut slot = self.shared.device.lock();
            let handle = slot
                .handle
                .as_mut()
                .ok_or_else(|| Error::CameraUnavailable("camera is not initialized".to_string()))?;
            handle.read_frame().map_err(|e| match e {
                Error::StreamingError(_) => e,
                other => Error::StreamingError(format!("failed to capture frame: {}", other)),
            })?
        };
        self.metrics.frame_captured();

        encode_with_fallback(self.encoder.as_ref(), &raw, format, quality).map_err(|e| {
            self.metrics.encode_failed();
            e
        })
    }

    /// One frame at snapshot quality; streaming must already be active
    pub fn snapshot(&self, format: FrameFormat) -> Result<EncodedFrame> {
        if !self.is_streaming() {
            return Err(Error::StreamingError(
                "streaming must be active before taking snapshots; start the stream first".to_string(),
            ));
        }
        self.capture_frame(format, self.config.snapshot_quality)
    }

    pub fn status(&self) -> CaptureStatus {
        let slot = self.shared.device.lock();
        let open = slot.state.is_open();
        let handle = slot.handle.as_ref().filter(|_| open);

        CaptureStatus {
            device_id: slot.device_id,
            state: slot.state,
            is_streaming: self.shared.streaming.load(Ordering::SeqCst),
            frame_rate: handle.map(|h| h.fps),
            resolution: handle.map(|h| format!("{}x{}", h.width, h.height)),
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::SeqCst)
    }

    /// Oldest buffered frame, if any; never waits
    pub fn try_take_frame(&self) -> Option<EncodedFrame> {
        self.shared.buffer.try_take()
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.shared.buffer
    }

    fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.config.stop_timeout_ms)
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        let worker = self.worker.get_mut();
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
        self.shared.streaming.store(false, Ordering::SeqCst);
        if let Some(running) = worker.take() {
            running.stop(Duration::from_millis(self.config.stop_timeout_ms));
        }
    }
}
