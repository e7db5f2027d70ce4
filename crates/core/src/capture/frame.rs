//! Frame types and image encoding
//!
//! A [`RawFrame`] is what the device hands back: packed RGB8 pixels plus the
//! capture time. It only lives until it has been encoded into an
//! [`EncodedFrame`], which is immutable and cheap to clone (`Bytes`).

use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Formats a frame can be encoded to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameFormat {
    Jpeg,
    #[default]
    Webp,
    Png,
}

/// Every format the encoder accepts, in advertised order
pub const SUPPORTED_FORMATS: [FrameFormat; 3] =
    [FrameFormat::Jpeg, FrameFormat::Webp, FrameFormat::Png];

impl FrameFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "jpeg",
            FrameFormat::Webp => "webp",
            FrameFormat::Png => "png",
        }
    }

    /// MIME type for `Content-Type` headers
    pub fn mime_type(&self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "image/jpeg",
            FrameFormat::Webp => "image/webp",
            FrameFormat::Png => "image/png",
        }
    }
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FrameFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(FrameFormat::Jpeg),
            "webp" => Ok(FrameFormat::Webp),
            "png" => Ok(FrameFormat::Png),
            other => Err(Error::EncodingFailure(format!(
                "Unsupported format '{}'. Use: jpeg, webp, or png",
                other
            ))),
        }
    }
}

/// One captured image, packed RGB8
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB, 3 bytes per pixel
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl RawFrame {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            captured_at: Utc::now(),
        }
    }

    /// Byte length an RGB8 frame of these dimensions must have
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Wire-ready image bytes
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub data: Bytes,
    pub format: FrameFormat,
    pub captured_at: DateTime<Utc>,
}

impl EncodedFrame {
    pub fn new(data: impl Into<Bytes>, format: FrameFormat) -> Self {
        Self {
            data: data.into(),
            format,
            captured_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Turns raw frames into encoded bytes
pub trait FrameEncoder: Send + Sync {
    fn encode(&self, frame: &RawFrame, format: FrameFormat, quality: u8) -> Result<EncodedFrame>;
}

/// [`FrameEncoder`] backed by the `image` crate, with libwebp for WebP
///
/// JPEG and WebP honor `quality`; PNG is lossless and ignores it.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageCodec;

impl FrameEncoder for ImageCodec {
    fn encode(&self, frame: &RawFrame, format: FrameFormat, quality: u8) -> Result<EncodedFrame> {
        if frame.width == 0 || frame.height == 0 || frame.data.len() != frame.expected_len() {
            return Err(Error::EncodingFailure(format!(
                "frame buffer is {} bytes, expected {} for {}x{} RGB",
                frame.data.len(),
                frame.expected_len(),
                frame.width,
                frame.height
            )));
        }

        let mut out = Vec::with_capacity(frame.data.len() / 8);
        match format {
            FrameFormat::Jpeg => JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
                .write_image(&frame.data, frame.width, frame.height, ExtendedColorType::Rgb8)?,
            FrameFormat::Png => PngEncoder::new(&mut out).write_image(
                &frame.data,
                frame.width,
                frame.height,
                ExtendedColorType::Rgb8,
            )?,
            FrameFormat::Webp => {
                let encoded = webp::Encoder::from_rgb(&frame.data, frame.width, frame.height)
                    .encode_simple(false, f32::from(quality.clamp(1, 100)))
                    .map_err(|e| Error::EncodingFailure(format!("webp encoder rejected frame: {:?}", e)))?;
                out.extend_from_slice(&encoded);
            }
        }

        Ok(EncodedFrame {
            data: Bytes::from(out),
            format,
            captured_at: frame.captured_at,
        })
    }
}

/// Encode to `format`, falling back to JPEG when WebP encoding fails
///
/// Returns the frame in whichever format was actually produced.
pub fn encode_with_fallback(
    encoder: &dyn FrameEncoder,
    frame: &RawFrame,
    format: FrameFormat,
    quality: u8,
) -> Result<EncodedFrame> {
    match encoder.encode(frame, format, quality) {
        Ok(encoded) => Ok(encoded),
        Err(e) if format == FrameFormat::Webp => {
            tracing::warn!(error = %e, "WebP encoding failed, falling back to JPEG");
            encoder.encode(frame, FrameFormat::Jpeg, quality)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_frame(width: u32, height: u32) -> RawFrame {
        RawFrame::new(width, height, vec![128u8; (width * height * 3) as usize])
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("jpeg".parse::<FrameFormat>().unwrap(), FrameFormat::Jpeg);
        assert_eq!("JPG".parse::<FrameFormat>().unwrap(), FrameFormat::Jpeg);
        assert_eq!("webp".parse::<FrameFormat>().unwrap(), FrameFormat::Webp);
        assert_eq!("png".parse::<FrameFormat>().unwrap(), FrameFormat::Png);
        assert!("gif".parse::<FrameFormat>().is_err());
        assert_eq!(FrameFormat::default(), FrameFormat::Webp);
        assert_eq!(FrameFormat::Png.mime_type(), "image/png");
    }

    #[test]
    fn test_encode_magic_bytes() {
        let frame = gray_frame(16, 8);

        let jpeg = ImageCodec.encode(&frame, FrameFormat::Jpeg, 85).unwrap();
        assert_eq!(&jpeg.data[..2], &[0xFF, 0xD8]);

        let png = ImageCodec.encode(&frame, FrameFormat::Png, 85).unwrap();
        assert_eq!(&png.data[1..4], b"PNG");

        let webp = ImageCodec.encode(&frame, FrameFormat::Webp, 85).unwrap();
        assert_eq!(&webp.data[..4], b"RIFF");
        assert_eq!(&webp.data[8..12], b"WEBP");
        assert_eq!(webp.format, FrameFormat::Webp);
    }

    #[test]
    fn test_webp_honors_quality() {
        // Busy pattern so quantization shows in the output size
        let (width, height) = (64u32, 64u32);
        let data = (0..width * height * 3)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        let frame = RawFrame::new(width, height, data);

        let low = ImageCodec.encode(&frame, FrameFormat::Webp, 10).unwrap();
        let high = ImageCodec.encode(&frame, FrameFormat::Webp, 95).unwrap();
        assert_eq!(&low.data[8..12], b"WEBP");
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_encode_rejects_short_buffer() {
        let frame = RawFrame::new(16, 8, vec![0u8; 10]);
        let result = ImageCodec.encode(&frame, FrameFormat::Jpeg, 85);
        assert!(matches!(result, Err(Error::EncodingFailure(_))));
    }

    struct NoWebp;

    impl FrameEncoder for NoWebp {
        fn encode(&self, frame: &RawFrame, format: FrameFormat, quality: u8) -> Result<EncodedFrame> {
            if format == FrameFormat::Webp {
                return Err(Error::EncodingFailure("webp unavailable".to_string()));
            }
            ImageCodec.encode(frame, format, quality)
        }
    }

    #[test]
    fn test_webp_falls_back_to_jpeg() {
        let frame = gray_frame(8, 8);

        let encoded = encode_with_fallback(&NoWebp, &frame, FrameFormat::Webp, 90).unwrap();
        assert_eq!(encoded.format, FrameFormat::Jpeg);

        // Only WebP falls back
        let frame = RawFrame::new(8, 8, vec![]);
        let result = encode_with_fallback(&NoWebp, &frame, FrameFormat::Png, 90);
        assert!(matches!(result, Err(Error::EncodingFailure(_))));
    }
}
