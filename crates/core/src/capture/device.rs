//! Capture device abstraction
//!
//! A [`DeviceOpener`] turns a device index into an open [`CaptureDevice`].
//! Dropping the device closes the underlying OS resource.

use serde::Serialize;

use super::frame::RawFrame;
use crate::error::Result;

/// An open capture resource
pub trait CaptureDevice: Send {
    /// Block until the next frame is available (bounded by the backend's own timeout)
    fn read_frame(&mut self) -> Result<RawFrame>;

    /// Request a resolution and frame rate; backends may settle on something close
    fn configure(&mut self, width: u32, height: u32, fps: u32) -> Result<()>;
}

/// Opens capture devices by index
pub trait DeviceOpener: Send + Sync {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>>;

    /// Backend name for logs
    fn name(&self) -> &'static str;
}

/// Device indices tried in order by `acquire`, without repeats
pub fn candidate_indices(preferred: u32) -> Vec<u32> {
    let mut candidates = Vec::with_capacity(4);
    for index in [preferred, 0, 1, 2] {
        if !candidates.contains(&index) {
            candidates.push(index);
        }
    }
    candidates
}

/// The open device together with the settings applied to it
pub struct DeviceHandle {
    pub index: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    device: Box<dyn CaptureDevice>,
}

impl DeviceHandle {
    pub fn new(index: u32, width: u32, height: u32, fps: u32, device: Box<dyn CaptureDevice>) -> Self {
        Self {
            index,
            width,
            height,
            fps,
            device,
        }
    }

    pub fn read_frame(&mut self) -> Result<RawFrame> {
        self.device.read_frame()
    }
}

impl std::fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("index", &self.index)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("fps", &self.fps)
            .field("device", &"Box<dyn CaptureDevice>")
            .finish()
    }
}

/// Result of probing one device index
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub index: u32,
    pub opened: bool,
    pub readable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn is_working(&self) -> bool {
        self.opened && self.readable
    }
}

/// Try every index: open it, read one frame, close it again
pub fn probe_devices(opener: &dyn DeviceOpener, indices: impl IntoIterator<Item = u32>) -> Vec<ProbeResult> {
    indices
        .into_iter()
        .map(|index| {
            let mut result = ProbeResult {
                index,
                opened: false,
                readable: false,
                width: None,
                height: None,
                error: None,
            };

            let mut device = match opener.open(index) {
                Ok(device) => device,
                Err(e) => {
                    result.error = Some(e.to_string());
                    return result;
                }
            };
            result.opened = true;

            match device.read_frame() {
                Ok(frame) => {
                    result.readable = true;
                    result.width = Some(frame.width);
                    result.height = Some(frame.height);
                }
                Err(e) => result.error = Some(e.to_string()),
            }
            tracing::debug!(index, opened = result.opened, readable = result.readable, "Checked device");
            result
        })
        .collect()
}
