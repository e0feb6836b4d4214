//! Capability interfaces for the external vision models.
//!
//! Face detection and person segmentation run inside vendor models; the
//! filters only consume their results through these traits.

use crate::core::Frame;
use crate::error::CaptureResult;

/// Axis-aligned face bounding box in frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FaceBox {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Per-pixel foreground confidence at the model's own resolution.
///
/// `confidence` is row-major, `width * height` values in `0.0..=1.0`
/// (1.0 = person).
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    pub confidence: Vec<f32>,
}

impl SegmentationMask {
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.confidence.len() >= self.width as usize * self.height as usize
    }
}

/// Face detector: zero or more boxes per still frame.
pub trait FaceDetector: Send {
    fn detect_faces(&mut self, frame: &Frame) -> CaptureResult<Vec<FaceBox>>;

    fn name(&self) -> &str {
        "face-detector"
    }
}

/// Person segmenter producing a foreground mask.
pub trait Segmenter: Send {
    fn segment(&mut self, frame: &Frame) -> CaptureResult<SegmentationMask>;

    fn name(&self) -> &str {
        "segmenter"
    }
}
