//! Capture and distribution engine
//!
//! ```text
//!  DeviceOpener ──open──► DeviceHandle ◄── device lock ──┐
//!                              │                         │
//!                        read_frame()              CaptureManager
//!                              │                  (acquire / start / stop /
//!                              ▼                   release / snapshot / status)
//!                     capture loop (thread)              │
//!                     encode ─► FrameBuffer ◄── try_take ┘ (stream readers)
//! ```

pub mod buffer;
pub mod device;
pub mod frame;
pub mod manager;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;
mod worker;

pub use buffer::FrameBuffer;
pub use device::{probe_devices, CaptureDevice, DeviceHandle, DeviceOpener, ProbeResult};
pub use frame::{
    encode_with_fallback, EncodedFrame, FrameEncoder, FrameFormat, ImageCodec, RawFrame,
    SUPPORTED_FORMATS,
};
pub use manager::{CaptureManager, CaptureState, CaptureStatus, StartOutcome, StopOutcome};
pub use synthetic::SyntheticOpener;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Opener;

use std::sync::Arc;

use crate::config::CaptureBackend;
use crate::error::Result;

/// Build the opener for a configured backend
pub fn opener_for(backend: CaptureBackend) -> Result<Arc<dyn DeviceOpener>> {
    match backend {
        CaptureBackend::Synthetic => Ok(Arc::new(SyntheticOpener::new())),
        #[cfg(feature = "v4l2")]
        CaptureBackend::V4l2 => Ok(Arc::new(V4l2Opener)),
        #[cfg(not(feature = "v4l2"))]
        CaptureBackend::V4l2 => Err(crate::error::Error::Config(
            "the v4l2 backend requires building with the `v4l2` feature".to_string(),
        )),
    }
}
