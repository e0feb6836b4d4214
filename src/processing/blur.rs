//! Background blur driven by a person-segmentation mask.

use fast_image_resize::Resizer;
use frame_scale::cpu::scale_mask;
use frame_scale::geometry::Size;
use image::{ImageBuffer, Rgba, imageops};
use tracing::{debug, warn};

use super::chain::{FilterContext, FrameFilter};
use super::detectors::{SegmentationMask, Segmenter};
use crate::core::Frame;
use crate::error::{CaptureError, CaptureResult};

/// Blends a Gaussian-blurred copy of the frame behind the segmented subject.
///
/// Without a segmenter attached the filter is an exact pass-through: the
/// output is the input frame itself.
pub struct BackgroundBlurFilter {
    segmenter: Option<Box<dyn Segmenter>>,
    sigma: f32,
    resizer: Resizer,
}

impl BackgroundBlurFilter {
    pub fn new(segmenter: Option<Box<dyn Segmenter>>, sigma: f32) -> Self {
        Self {
            segmenter,
            sigma,
            resizer: Resizer::new(),
        }
    }

    pub fn has_segmenter(&self) -> bool {
        self.segmenter.is_some()
    }

    /// Attach a segmenter, returning the one it replaces.
    pub fn attach(&mut self, segmenter: Box<dyn Segmenter>) -> Option<Box<dyn Segmenter>> {
        self.segmenter.replace(segmenter)
    }

    pub fn detach(&mut self) -> Option<Box<dyn Segmenter>> {
        self.segmenter.take()
    }

    fn render(
        &mut self,
        frame: &Frame,
        mask: &SegmentationMask,
        ctx: &FilterContext<'_>,
    ) -> CaptureResult<Frame> {
        let size = Size::new(frame.width(), frame.height());
        let len = size.pixel_count() * 4;
        let weights = scale_mask(
            &mut self.resizer,
            &mask.confidence,
            Size::new(mask.width, mask.height),
            size,
        )?;

        let original = frame
            .data()
            .get(..len)
            .ok_or_else(|| CaptureError::processing("background_blur", "frame buffer too small"))?;
        let view = ImageBuffer::<Rgba<u8>, &[u8]>::from_raw(frame.width(), frame.height(), original)
            .ok_or_else(|| CaptureError::processing("background_blur", "frame buffer too small"))?;
        let blurred = imageops::blur(&view, self.sigma);
        let blurred = blurred.as_raw();

        let mut out = ctx.pool.get_buffer(len);
        for (i, &w) in weights.iter().enumerate() {
            let w = w as u32;
            for c in i * 4..i * 4 + 4 {
                out[c] = ((original[c] as u32 * w + blurred[c] as u32 * (255 - w) + 127) / 255) as u8;
            }
        }
        Ok(frame.derive(out))
    }
}

impl FrameFilter for BackgroundBlurFilter {
    fn name(&self) -> &'static str {
        "background-blur"
    }

    fn filter(&mut self, frame: &Frame, ctx: &FilterContext<'_>) -> Option<Frame> {
        let segmenter = self.segmenter.as_mut()?;
        if !frame.format().is_packed_4ch() {
            debug!(format = %frame.format(), "Blur skipped for non-packed frame");
            return None;
        }

        let mask = match segmenter.segment(frame) {
            Ok(mask) if mask.is_well_formed() => mask,
            Ok(mask) => {
                ctx.stats.record_detector_failure();
                warn!(
                    width = mask.width,
                    height = mask.height,
                    values = mask.confidence.len(),
                    "Segmenter returned a malformed mask"
                );
                return None;
            }
            Err(e) => {
                ctx.stats.record_detector_failure();
                warn!(segmenter = segmenter.name(), error = %e, "Segmentation failed, passing frame through");
                return None;
            }
        };

        match self.render(frame, &mask, ctx) {
            Ok(out) => Some(out),
            Err(e) => {
                warn!(error = %e, "Background blur failed, passing frame through");
                None
            }
        }
    }
}
