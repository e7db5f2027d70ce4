//! Generated test-pattern backend
//!
//! Works without hardware. Used as the default backend and by the test suite,
//! which needs devices that refuse to open, refuse to read, or disappear
//! mid-stream.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::device::{CaptureDevice, DeviceOpener};
use super::frame::RawFrame;
use crate::error::{Error, Result};

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;

/// Opens synthetic devices
#[derive(Debug, Clone)]
pub struct SyntheticOpener {
    unopenable: HashSet<u32>,
    unreadable: HashSet<u32>,
    read_delay: Duration,
    disconnected: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

impl Default for SyntheticOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticOpener {
    pub fn new() -> Self {
        Self {
            unopenable: HashSet::new(),
            unreadable: HashSet::new(),
            read_delay: Duration::ZERO,
            disconnected: Arc::new(AtomicBool::new(false)),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Indices whose `open` fails
    pub fn with_unopenable(mut self, indices: impl IntoIterator<Item = u32>) -> Self {
        self.unopenable.extend(indices);
        self
    }

    /// Indices that open but never produce a frame
    pub fn with_unreadable(mut self, indices: impl IntoIterator<Item = u32>) -> Self {
        self.unreadable.extend(indices);
        self
    }

    /// Simulated sensor latency per read
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Switch that, once set, makes every open device fail its reads
    pub fn disconnect_switch(&self) -> Arc<AtomicBool> {
        self.disconnected.clone()
    }

    /// Number of successful opens so far
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl DeviceOpener for SyntheticOpener {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>> {
        if self.unopenable.contains(&index) {
            return Err(Error::CameraUnavailable(format!(
                "synthetic device {} cannot be opened",
                index
            )));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(SyntheticDevice {
            index,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            tick: 0,
            readable: !self.unreadable.contains(&index),
            read_delay: self.read_delay,
            disconnected: self.disconnected.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

struct SyntheticDevice {
    index: u32,
    width: u32,
    height: u32,
    tick: u32,
    readable: bool,
    read_delay: Duration,
    disconnected: Arc<AtomicBool>,
}

impl CaptureDevice for SyntheticDevice {
    fn read_frame(&mut self) -> Result<RawFrame> {
        if !self.readable || self.disconnected.load(Ordering::SeqCst) {
            return Err(Error::StreamingError(format!(
                "failed to read frame from synthetic device {}",
                self.index
            )));
        }
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }

        self.tick = self.tick.wrapping_add(1);
        Ok(RawFrame::new(
            self.width,
            self.height,
            gradient(self.width, self.height, self.tick),
        ))
    }

    fn configure(&mut self, width: u32, height: u32, _fps: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::Config(format!("invalid resolution {}x{}", width, height)));
        }
        self.width = width;
        self.height = height;
        Ok(())
    }
}

/// Diagonal gradient that scrolls by a few pixels each tick
fn gradient(width: u32, height: u32, tick: u32) -> Vec<u8> {
    let mut data = Vec::with_capacity(width as usize * height as usize * 3);
    let shift = tick.wrapping_mul(4);
    for y in 0..height {
        for x in 0..width {
            let r = (x.wrapping_add(shift) % 256) as u8;
            let g = (y % 256) as u8;
            let b = (x.wrapping_add(y).wrapping_add(shift) / 2 % 256) as u8;
            data.extend_from_slice(&[r, g, b]);
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_change_between_reads() {
        let opener = SyntheticOpener::new();
        let mut device = opener.open(0).unwrap();
        device.configure(32, 16, 10).unwrap();

        let a = device.read_frame().unwrap();
        let b = device.read_frame().unwrap();
        assert_eq!(a.data.len(), a.expected_len());
        assert_eq!((a.width, a.height), (32, 16));
        assert_ne!(a.data, b.data);
        assert_eq!(opener.open_count(), 1);
    }

    #[test]
    fn test_disconnect_switch() {
        let opener = SyntheticOpener::new();
        let mut device = opener.open(3).unwrap();
        assert!(device.read_frame().is_ok());

        opener.disconnect_switch().store(true, Ordering::SeqCst);
        assert!(matches!(device.read_frame(), Err(Error::StreamingError(_))));
    }
}
