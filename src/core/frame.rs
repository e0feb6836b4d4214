//! # Frame
//!
//! One captured image plus the metadata every stage needs to interpret it.
//!
//! A [`Frame`] is moved by value from stage to stage: producer, then slot, then
//! filter chain, then sink. The pixel bytes live behind an `Arc` so a frame that
//! passes through the chain untouched reaches the sink without a copy, while a
//! filter that changes pixels writes into a fresh buffer and never mutates bytes
//! another stage can see.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, CaptureResult};

/// Pixel layout tag carried by every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Packed 8-bit RGBA.
    Rgba,
    /// Packed 8-bit BGRA.
    Bgra,
    /// Camera-native semi-planar YUV 4:2:0 (Y plane, interleaved VU).
    Nv21,
}

impl PixelFormat {
    /// Byte length of one `width x height` image in this layout.
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgba | PixelFormat::Bgra => pixels * 4,
            PixelFormat::Nv21 => {
                let chroma = (width as usize).div_ceil(2) * (height as usize).div_ceil(2) * 2;
                pixels + chroma
            }
        }
    }

    /// Whether the filters can operate on this layout directly.
    pub fn is_packed_4ch(self) -> bool {
        matches!(self, PixelFormat::Rgba | PixelFormat::Bgra)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgra => "bgra",
            PixelFormat::Nv21 => "nv21",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rotation the sink must apply to display the frame upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Up,
    Right,
    Down,
    Left,
}

/// A captured image buffer with format, orientation and timestamp metadata.
///
/// Dimensions and format are fixed at construction, where [`Frame::new`]
/// checks them against the buffer length.
#[derive(Debug, Clone)]
pub struct Frame {
    data: Arc<Vec<u8>>,
    width: u32,
    height: u32,
    format: PixelFormat,
    pub orientation: Orientation,
    /// Monotonic capture time.
    pub captured_at: Instant,
    /// Per-session sequence number assigned by the source.
    pub sequence: u64,
}

impl Frame {
    /// Wrap `data` as a frame, checking its length against the format.
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> CaptureResult<Self> {
        let expected = format.frame_len(width, height);
        if width == 0 || height == 0 || data.len() < expected {
            return Err(CaptureError::source(format!(
                "{}x{} {} frame needs {} bytes, got {}",
                width,
                height,
                format,
                expected,
                data.len()
            )));
        }
        Ok(Self {
            data: Arc::new(data),
            width,
            height,
            format,
            orientation: Orientation::Up,
            captured_at: Instant::now(),
            sequence: 0,
        })
    }

    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Build an output frame with new pixels and this frame's metadata.
    ///
    /// `data` is not length-checked; filters size it from this frame.
    pub fn derive(&self, data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(data),
            width: self.width,
            height: self.height,
            format: self.format,
            orientation: self.orientation,
            captured_at: self.captured_at,
            sequence: self.sequence,
        }
    }

    /// True when both frames share one pixel buffer.
    pub fn shares_buffer(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }

    /// Reclaim the pixel buffer if no other handle references it.
    pub fn into_buffer(self) -> Option<Vec<u8>> {
        Arc::try_unwrap(self.data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_len_per_format() {
        assert_eq!(PixelFormat::Rgba.frame_len(640, 360), 640 * 360 * 4);
        assert_eq!(PixelFormat::Nv21.frame_len(1280, 720), 1280 * 720 * 3 / 2);
        // Odd sizes round the chroma plane up.
        assert_eq!(PixelFormat::Nv21.frame_len(3, 3), 9 + 2 * 2 * 2);
    }

    #[test]
    fn test_new_rejects_short_buffer() {
        let err = Frame::new(vec![0; 10], 4, 4, PixelFormat::Rgba).unwrap_err();
        assert_eq!(err.category(), "source");
        assert!(Frame::new(vec![0; 64], 4, 4, PixelFormat::Rgba).is_ok());
    }

    #[test]
    fn test_clone_shares_and_derive_does_not() {
        let frame = Frame::new(vec![7; 16], 2, 2, PixelFormat::Bgra)
            .unwrap()
            .with_sequence(9);
        let copy = frame.clone();
        assert!(frame.shares_buffer(&copy));

        let derived = frame.derive(vec![1; 16]);
        assert!(!derived.shares_buffer(&frame));
        assert_eq!(derived.sequence, 9);
        assert_eq!(derived.format(), PixelFormat::Bgra);
    }

    #[test]
    fn test_into_buffer_only_when_unique() {
        let frame = Frame::new(vec![1; 16], 2, 2, PixelFormat::Rgba).unwrap();
        let other = frame.clone();
        assert!(frame.into_buffer().is_none());
        assert_eq!(other.into_buffer().map(|b| b.len()), Some(16));
    }
}
