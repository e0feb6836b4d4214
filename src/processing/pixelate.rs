//! # Face Pixelation
//!
//! Obscures detected faces with a soft-edged pixelation mask.
//!
//! Per frame:
//!
//! 1. Ask the face detector for boxes. A detector error counts as "no faces".
//! 2. Update the face memory. A miss keeps the last boxes for up to
//!    `persistence_frames` frames, then clears them.
//! 3. With no boxes to mask the frame passes through untouched.
//! 4. Otherwise build a radial mask per face (radius = box height divided by
//!    `radius_divisor`, linear fall-off over `feather_px`), combine the faces
//!    with source-over compositing, block-pixelate the whole frame and blend it
//!    over the original through the mask.

use fast_image_resize::Resizer;
use frame_scale::cpu::pixelate_rgba;
use frame_scale::geometry::Size;
use tracing::{debug, trace, warn};

use super::chain::{FilterContext, FrameFilter};
use super::detectors::{FaceBox, FaceDetector};
use crate::config::PixelationConfig;
use crate::core::Frame;
use crate::error::CaptureResult;

/// Last reported faces and how many frames they have been carried without a hit.
#[derive(Debug, Default)]
struct FaceMemory {
    faces: Vec<FaceBox>,
    misses: u32,
}

impl FaceMemory {
    /// Fold this frame's detections in and report whether anything should be masked.
    fn observe(&mut self, detected: Vec<FaceBox>, persistence_frames: u32) -> bool {
        if !detected.is_empty() {
            self.faces = detected;
            self.misses = 0;
            return true;
        }
        if self.faces.is_empty() {
            return false;
        }
        if self.misses < persistence_frames {
            self.misses += 1;
            return true;
        }
        self.clear();
        false
    }

    fn clear(&mut self) {
        self.faces.clear();
        self.misses = 0;
    }
}

pub struct PixelationFilter {
    detector: Box<dyn FaceDetector>,
    config: PixelationConfig,
    memory: FaceMemory,
    resizer: Resizer,
    pixelated: Vec<u8>,
    mask: Vec<f32>,
}

impl PixelationFilter {
    pub fn new(detector: Box<dyn FaceDetector>, config: PixelationConfig) -> Self {
        Self {
            detector,
            config,
            memory: FaceMemory::default(),
            resizer: Resizer::new(),
            pixelated: Vec::new(),
            mask: Vec::new(),
        }
    }

    /// Faces currently remembered, either fresh or carried over a miss.
    pub fn remembered_faces(&self) -> &[FaceBox] {
        &self.memory.faces
    }

    fn build_mask(&mut self, width: u32, height: u32, faces: &[FaceBox]) {
        let n = width as usize * height as usize;
        self.mask.clear();
        self.mask.resize(n, 0.0);

        let feather = self.config.feather_px;
        for face in faces {
            let (cx, cy) = face.center();
            let radius = face.height / self.config.radius_divisor;
            let reach = radius + feather;

            let x0 = (cx - reach).floor().max(0.0) as u32;
            let y0 = (cy - reach).floor().max(0.0) as u32;
            let x1 = ((cx + reach).ceil().max(0.0) as u32).min(width);
            let y1 = ((cy + reach).ceil().max(0.0) as u32).min(height);

            for y in y0..y1 {
                let row = y as usize * width as usize;
                let dy = y as f32 + 0.5 - cy;
                for x in x0..x1 {
                    let dx = x as f32 + 0.5 - cx;
                    let d = (dx * dx + dy * dy).sqrt();
                    let a = if d <= radius {
                        1.0
                    } else if feather > 0.0 && d < reach {
                        1.0 - (d - radius) / feather
                    } else {
                        continue;
                    };
                    let m = &mut self.mask[row + x as usize];
                    *m = a + *m * (1.0 - a);
                }
            }
        }
    }

    fn render(&mut self, frame: &Frame, ctx: &FilterContext<'_>) -> CaptureResult<Frame> {
        let size = Size::new(frame.width(), frame.height());
        let len = size.pixel_count() * 4;
        self.pixelated.resize(len, 0);
        pixelate_rgba(
            &mut self.resizer,
            frame.data(),
            size,
            self.config.block_size,
            &mut self.pixelated,
        )?;

        let faces = self.memory.faces.clone();
        self.build_mask(frame.width(), frame.height(), &faces);

        let original = &frame.data()[..len];
        let mut out = ctx.pool.get_buffer(len);
        for (i, &m) in self.mask.iter().enumerate() {
            let px = i * 4..i * 4 + 4;
            if m <= 0.0 {
                out[px.clone()].copy_from_slice(&original[px]);
            } else if m >= 1.0 {
                out[px.clone()].copy_from_slice(&self.pixelated[px]);
            } else {
                for c in px {
                    let v = self.pixelated[c] as f32 * m + original[c] as f32 * (1.0 - m);
                    out[c] = v.round() as u8;
                }
            }
        }

        Ok(frame.derive(out))
    }
}

impl FrameFilter for PixelationFilter {
    fn name(&self) -> &'static str {
        "pixelate"
    }

    fn filter(&mut self, frame: &Frame, ctx: &FilterContext<'_>) -> Option<Frame> {
        if !frame.format().is_packed_4ch() {
            debug!(format = %frame.format(), "Pixelation skipped for non-packed frame");
            return None;
        }

        let detected = match self.detector.detect_faces(frame) {
            Ok(faces) => faces,
            Err(e) => {
                ctx.stats.record_detector_failure();
                warn!(detector = self.detector.name(), error = %e, "Face detection failed, treating as miss");
                Vec::new()
            }
        };
        let hits = detected.len();

        if !self
            .memory
            .observe(detected, self.config.persistence_frames)
        {
            return None;
        }
        trace!(hits, carried = self.memory.misses, "Pixelating faces");

        match self.render(frame, ctx) {
            Ok(out) => Some(out),
            Err(e) => {
                warn!(error = %e, "Pixelation failed, passing frame through");
                None
            }
        }
    }

    fn reset(&mut self) {
        self.memory.clear();
    }
}
