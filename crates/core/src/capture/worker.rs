//! Background capture loop
//!
//! One OS thread per streaming session. Each cycle reads a frame under the
//! device lock, encodes it outside the lock, publishes it to the frame buffer
//! and sleeps off the rest of the frame interval. The sleep doubles as the
//! stop wait, so a stop request interrupts it immediately.
//!
//! Each loop carries the session generation it was started for. Once a stop
//! or a newer start supersedes it, the loop exits without touching shared
//! state.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use super::frame::{encode_with_fallback, FrameEncoder, FrameFormat};
use super::manager::{CaptureState, Shared};
use crate::error::{Error, Result};
use crate::metrics::Metrics;

/// Consecutive read failures treated as device loss
const MAX_CONSECUTIVE_READ_FAILURES: u32 = 2;

/// Parameters fixed for the lifetime of one loop
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoopSettings {
    pub fps: u32,
    pub format: FrameFormat,
    pub quality: u8,
}

impl LoopSettings {
    fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fps.max(1) as f64)
    }
}

/// Handle to a running capture loop
pub(crate) struct Worker {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    thread: JoinHandle<()>,
}

impl Worker {
    pub fn spawn(
        shared: Arc<Shared>,
        encoder: Arc<dyn FrameEncoder>,
        metrics: Arc<Metrics>,
        settings: LoopSettings,
        generation: u64,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let (done_tx, done_rx) = channel::bounded::<()>(1);
        metrics.capture_loop_started();

        let thread = std::thread::Builder::new()
            .name("homecam-capture".to_string())
            .spawn(move || {
                run(&shared, encoder.as_ref(), &metrics, settings, generation, &stop_rx);
                let _ = done_tx.send(());
            })
            .map_err(|e| Error::Internal(format!("failed to spawn capture thread: {}", e)))?;

        Ok(Self {
            stop_tx,
            done_rx,
            thread,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Signal the loop and wait up to `timeout` for it to exit
    ///
    /// Returns `false` if the loop was still running when the wait expired;
    /// the thread is then detached and exits on its own at the end of its
    /// current cycle.
    pub fn stop(self, timeout: Duration) -> bool {
        let _ = self.stop_tx.try_send(());

        match self.done_rx.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = self.thread.join();
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    "Capture loop did not exit in time, detaching"
                );
                false
            }
        }
    }
}

fn run(
    shared: &Shared,
    encoder: &dyn FrameEncoder,
    metrics: &Metrics,
    settings: LoopSettings,
    generation: u64,
    stop_rx: &Receiver<()>,
) {
    let interval = settings.frame_interval();
    let mut consecutive_failures = 0u32;

    tracing::info!(fps = settings.fps, format = %settings.format, generation, "Capture loop started");

    while shared.streaming.load(Ordering::SeqCst) && shared.is_current(generation) {
        let cycle_start = Instant::now();

        let read = {
            let mut slot = shared.device.lock();
            match slot.handle.as_mut() {
                Some(handle) => handle.read_frame(),
                None => {
                    tracing::debug!("Device closed under the capture loop");
                    break;
                }
            }
        };

        match read {
            Ok(raw) => {
                consecutive_failures = 0;
                metrics.frame_captured();

                match encode_with_fallback(encoder, &raw, settings.format, settings.quality) {
                    Ok(frame) => {
                        let evicted = shared.buffer.publish(frame);
                        metrics.frame_published();
                        if evicted > 0 {
                            metrics.frames_evicted(evicted as u64);
                        }
                    }
                    Err(e) => {
                        metrics.encode_failed();
                        tracing::warn!(error = %e, "Dropping frame that failed to encode");
                    }
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                metrics.read_failed();
                tracing::warn!(error = %e, consecutive_failures, "Frame read failed");

                if consecutive_failures >= MAX_CONSECUTIVE_READ_FAILURES {
                    let mut slot = shared.device.lock();
                    if shared.is_current(generation) {
                        tracing::error!("Camera lost, stopping capture loop");
                        shared.streaming.store(false, Ordering::SeqCst);
                        slot.handle = None;
                        slot.state = CaptureState::Error;
                    } else {
                        tracing::debug!(generation, "Superseded loop saw read failures, leaving device alone");
                    }
                    break;
                }
            }
        }

        let wait = interval.saturating_sub(cycle_start.elapsed());
        match stop_rx.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    tracing::info!("Capture loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::device::{CaptureDevice, DeviceHandle};
    use crate::capture::frame::{ImageCodec, RawFrame};
    use crate::capture::manager::DeviceSlot;
    use crate::capture::FrameBuffer;
    use std::sync::atomic::{AtomicBool, AtomicU64};
    use std::sync::Weak;

    /// Fails every read, optionally starting a newer session during read N
    struct FailingDevice {
        shared: Weak<Shared>,
        supersede_on: Option<u32>,
        reads: u32,
    }

    impl CaptureDevice for FailingDevice {
        fn read_frame(&mut self) -> Result<RawFrame> {
            self.reads += 1;
            if self.supersede_on == Some(self.reads) {
                if let Some(shared) = self.shared.upgrade() {
                    shared.generation.fetch_add(1, Ordering::SeqCst);
                }
            }
            Err(Error::StreamingError("no frame".to_string()))
        }

        fn configure(&mut self, _width: u32, _height: u32, _fps: u32) -> Result<()> {
            Ok(())
        }
    }

    /// Streaming session at generation 1 over a failing device
    fn streaming_shared(supersede_on: Option<u32>) -> Arc<Shared> {
        Arc::new_cyclic(|weak| Shared {
            device: parking_lot::Mutex::new(DeviceSlot {
                handle: Some(DeviceHandle::new(
                    0,
                    16,
                    16,
                    100,
                    Box::new(FailingDevice {
                        shared: weak.clone(),
                        supersede_on,
                        reads: 0,
                    }),
                )),
                state: CaptureState::Streaming,
                device_id: 0,
            }),
            streaming: AtomicBool::new(true),
            generation: AtomicU64::new(1),
            buffer: FrameBuffer::new(2),
        })
    }

    fn settings() -> LoopSettings {
        LoopSettings {
            fps: 100,
            format: FrameFormat::Jpeg,
            quality: 80,
        }
    }

    #[test]
    fn test_device_loss_ends_current_session() {
        let shared = streaming_shared(None);
        let metrics = Metrics::new();
        let (_stop_tx, stop_rx) = channel::bounded::<()>(1);

        run(&shared, &ImageCodec, &metrics, settings(), 1, &stop_rx);

        let slot = shared.device.lock();
        assert!(slot.handle.is_none());
        assert_eq!(slot.state, CaptureState::Error);
        assert!(!shared.streaming.load(Ordering::SeqCst));
        assert_eq!(metrics.snapshot().read_failures, 2);
    }

    #[test]
    fn test_superseded_loop_leaves_newer_session_alone() {
        let shared = streaming_shared(Some(2));
        let metrics = Metrics::new();
        let (_stop_tx, stop_rx) = channel::bounded::<()>(1);

        run(&shared, &ImageCodec, &metrics, settings(), 1, &stop_rx);

        let slot = shared.device.lock();
        assert!(slot.handle.is_some());
        assert_eq!(slot.state, CaptureState::Streaming);
        assert!(shared.streaming.load(Ordering::SeqCst));
        assert_eq!(metrics.snapshot().read_failures, 2);
    }

    #[test]
    fn test_loop_exits_once_superseded() {
        let shared = streaming_shared(None);
        let metrics = Metrics::new();
        let (_stop_tx, stop_rx) = channel::bounded::<()>(1);

        shared.generation.store(5, Ordering::SeqCst);
        run(&shared, &ImageCodec, &metrics, settings(), 1, &stop_rx);

        assert_eq!(metrics.snapshot().read_failures, 0);
        assert!(shared.device.lock().handle.is_some());
    }
}
