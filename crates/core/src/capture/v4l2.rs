//! Video4Linux2 capture backend
//!
//! Requests MJPEG from the driver and decodes it to RGB; drivers that only
//! offer YUYV are converted in software. Dequeues time out, so a stalled
//! device surfaces as a read failure instead of holding the device lock.

use std::io;
use std::time::Duration;

use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::device::{CaptureDevice, DeviceOpener};
use super::frame::RawFrame;
use crate::error::{Error, Result};

const BUFFER_COUNT: u32 = 4;

/// Shortest dequeue timeout
const MIN_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Frame intervals to wait before a dequeue counts as stalled
const STALL_INTERVALS: u32 = 3;

/// Dequeue timeout for a device running at `fps`
fn read_timeout(fps: u32) -> Duration {
    let interval = Duration::from_millis(1000 / u64::from(fps.max(1)));
    (interval * STALL_INTERVALS).max(MIN_READ_TIMEOUT)
}

fn map_read_error(index: u32, timeout: Duration, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::StreamingError(format!(
            "no frame from /dev/video{} within {} ms",
            index,
            timeout.as_millis()
        )),
        _ => Error::StreamingError(format!("failed to read frame from /dev/video{}: {}", index, err)),
    }
}

/// Opens `/dev/video<N>` devices
#[derive(Debug, Default, Clone, Copy)]
pub struct V4l2Opener;

impl DeviceOpener for V4l2Opener {
    fn open(&self, index: u32) -> Result<Box<dyn CaptureDevice>> {
        let device = Device::new(index as usize).map_err(|e| {
            Error::CameraUnavailable(format!("failed to open /dev/video{}: {}", index, e))
        })?;
        let format = device
            .format()
            .map_err(|e| Error::CameraUnavailable(format!("failed to query format: {}", e)))?;

        tracing::debug!(
            index,
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "Opened V4L2 device"
        );

        Ok(Box::new(V4l2Device {
            index,
            width: format.width,
            height: format.height,
            fourcc: format.fourcc,
            fps: 0,
            stream: None,
            device,
        }))
    }

    fn name(&self) -> &'static str {
        "v4l2"
    }
}

struct V4l2Device {
    index: u32,
    width: u32,
    height: u32,
    fourcc: FourCC,
    // 0 until configured
    fps: u32,
    // Declared before `device` so the mapped buffers are released first
    stream: Option<Stream<'static>>,
    device: Device,
}

impl V4l2Device {
    fn stream(&mut self) -> Result<&mut Stream<'static>> {
        if self.stream.is_none() {
            let mut stream = Stream::with_buffers(&self.device, Type::VideoCapture, BUFFER_COUNT)
                .map_err(|e| {
                    Error::StreamingError(format!(
                        "failed to start capture on /dev/video{}: {}",
                        self.index, e
                    ))
                })?;
            stream.set_timeout(read_timeout(self.fps));
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| Error::Internal("capture stream missing".to_string()))
    }
}

impl CaptureDevice for V4l2Device {
    fn read_frame(&mut self) -> Result<RawFrame> {
        let (width, height, fourcc, index) = (self.width, self.height, self.fourcc, self.index);
        let timeout = read_timeout(self.fps);
        let stream = self.stream()?;
        let (buf, meta) = stream.next().map_err(|e| map_read_error(index, timeout, e))?;
        let payload = &buf[..(meta.bytesused as usize).min(buf.len())];

        if fourcc == FourCC::new(b"MJPG") {
            let decoded = image::load_from_memory_with_format(payload, image::ImageFormat::Jpeg)
                .map_err(|e| Error::StreamingError(format!("corrupt MJPEG frame: {}", e)))?
                .to_rgb8();
            let (w, h) = decoded.dimensions();
            Ok(RawFrame::new(w, h, decoded.into_raw()))
        } else if fourcc == FourCC::new(b"YUYV") {
            Ok(RawFrame::new(width, height, yuyv_to_rgb(payload, width, height)?))
        } else {
            Err(Error::StreamingError(format!("unsupported pixel format {}", fourcc)))
        }
    }

    fn configure(&mut self, width: u32, height: u32, fps: u32) -> Result<()> {
        // Format changes are refused while buffers are mapped
        self.stream = None;

        let mut format = self
            .device
            .format()
            .map_err(|e| Error::CameraUnavailable(e.to_string()))?;
        format.width = width;
        format.height = height;
        format.fourcc = FourCC::new(b"MJPG");

        let applied = self
            .device
            .set_format(&format)
            .map_err(|e| Error::CameraUnavailable(format!("failed to set format: {}", e)))?;
        if applied.width != width || applied.height != height {
            tracing::warn!(
                requested = %format!("{}x{}", width, height),
                applied = %format!("{}x{}", applied.width, applied.height),
                "Driver adjusted resolution"
            );
        }
        self.width = applied.width;
        self.height = applied.height;
        self.fourcc = applied.fourcc;

        if let Err(e) = self.device.set_params(&Parameters::with_fps(fps)) {
            tracing::warn!(fps, error = %e, "Driver rejected frame rate");
        }
        self.fps = fps;
        Ok(())
    }
}

fn yuyv_to_rgb(payload: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixels = width as usize * height as usize;
    if payload.len() < pixels * 2 {
        return Err(Error::StreamingError(format!(
            "short YUYV frame: {} bytes for {}x{}",
            payload.len(),
            width,
            height
        )));
    }

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in payload[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0] as f32, chunk[1] as f32 - 128.0, chunk[2] as f32, chunk[3] as f32 - 128.0);
        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }
    Ok(rgb)
}
