//! # Filter Chain
//!
//! Runs the enabled filters over each frame in a fixed order: pixelation
//! first, blur second, so a face stays obscured after the background is
//! blurred.
//!
//! With no filter enabled the chain never touches the frame: the same buffer
//! moves through to the sink and neither model is called.

use std::sync::Arc;

use tracing::{debug, info};

use super::blur::BackgroundBlurFilter;
use super::detectors::{FaceDetector, Segmenter};
use super::pixelate::PixelationFilter;
use crate::config::{FilterSettings, PipelineConfig};
use crate::core::{BufferPool, Frame, PipelineStats};

/// Shared resources a filter may use while processing one frame.
pub struct FilterContext<'a> {
    pub pool: &'a BufferPool,
    pub stats: &'a PipelineStats,
}

/// A per-frame image transform.
pub trait FrameFilter: Send {
    fn name(&self) -> &'static str;

    /// Produce a modified copy of `frame`, or `None` to leave it unchanged.
    fn filter(&mut self, frame: &Frame, ctx: &FilterContext<'_>) -> Option<Frame>;

    /// Forget state carried between frames.
    fn reset(&mut self) {}

    /// Run the filter, recycling the input buffer when a new frame replaces it.
    fn apply(&mut self, frame: Frame, ctx: &FilterContext<'_>) -> Frame {
        match self.filter(&frame, ctx) {
            Some(out) => {
                if let Some(buffer) = frame.into_buffer() {
                    ctx.pool.return_buffer(buffer);
                }
                out
            }
            None => frame,
        }
    }
}

/// Result of one pass through the chain.
#[derive(Debug)]
pub struct ChainOutput {
    pub frame: Frame,
    /// Whether any filter changed the pixels.
    pub filtered: bool,
}

pub struct FilterChain {
    pixelation: Option<PixelationFilter>,
    blur: BackgroundBlurFilter,
    /// Segmenter held back while blur is disabled.
    parked_segmenter: Option<Box<dyn Segmenter>>,
    settings: FilterSettings,
    pool: Arc<BufferPool>,
    stats: Arc<PipelineStats>,
}

impl FilterChain {
    /// Build a chain with every filter disabled.
    ///
    /// A missing detector leaves pixelation a no-op even when enabled; a
    /// missing segmenter does the same for blur.
    pub fn new(
        config: &PipelineConfig,
        face_detector: Option<Box<dyn FaceDetector>>,
        segmenter: Option<Box<dyn Segmenter>>,
        pool: Arc<BufferPool>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            pixelation: face_detector.map(|d| PixelationFilter::new(d, config.pixelation)),
            blur: BackgroundBlurFilter::new(None, config.blur.sigma),
            parked_segmenter: segmenter,
            settings: FilterSettings::NONE,
            pool,
            stats,
        }
    }

    pub fn settings(&self) -> FilterSettings {
        self.settings
    }

    /// True when at least one filter is enabled.
    pub fn is_active(&self) -> bool {
        self.settings.any()
    }

    /// Enable or disable individual filters.
    ///
    /// Enabling blur attaches the segmenter; disabling detaches it, which
    /// turns the blur stage back into an exact pass-through.
    pub fn set_settings(&mut self, settings: FilterSettings) {
        if settings.blur_background && !self.blur.has_segmenter() {
            if let Some(segmenter) = self.parked_segmenter.take() {
                self.blur.attach(segmenter);
            }
        } else if !settings.blur_background {
            if let Some(segmenter) = self.blur.detach() {
                self.parked_segmenter = Some(segmenter);
            }
        }
        if settings.pixelate_faces && self.pixelation.is_none() {
            debug!("Pixelation enabled without a face detector; frames will pass through");
        }
        if settings != self.settings {
            info!(
                pixelate = settings.pixelate_faces,
                blur = settings.blur_background,
                "Filter settings changed"
            );
        }
        self.settings = settings;
    }

    /// Clear the last-known-face memory.
    pub fn reset_state(&mut self) {
        if let Some(pixelation) = self.pixelation.as_mut() {
            pixelation.reset();
        }
    }

    pub fn remembers_faces(&self) -> bool {
        self.pixelation
            .as_ref()
            .is_some_and(|p| !p.remembered_faces().is_empty())
    }

    /// Pixelation stage on its own. Pass-through when no detector is configured.
    pub fn apply_pixelation(&mut self, frame: Frame) -> Frame {
        let ctx = FilterContext { pool: &self.pool, stats: &self.stats };
        match self.pixelation.as_mut() {
            Some(pixelation) => pixelation.apply(frame, &ctx),
            None => frame,
        }
    }

    /// Blur stage on its own. Pass-through when no segmenter is attached.
    pub fn apply_background_blur(&mut self, frame: Frame) -> Frame {
        let ctx = FilterContext { pool: &self.pool, stats: &self.stats };
        self.blur.apply(frame, &ctx)
    }

    /// Run every enabled stage in order.
    pub fn process(&mut self, frame: Frame) -> ChainOutput {
        if !self.settings.any() {
            return ChainOutput { frame, filtered: false };
        }

        // A stage's output buffer is taken before its input goes back to the
        // pool, so a pointer change within one stage means new pixels.
        let mut current = frame;
        let mut filtered = false;
        if self.settings.pixelate_faces {
            let before = current.data().as_ptr();
            current = self.apply_pixelation(current);
            filtered |= current.data().as_ptr() != before;
        }
        if self.settings.blur_background {
            let before = current.data().as_ptr();
            current = self.apply_background_blur(current);
            filtered |= current.data().as_ptr() != before;
        }

        ChainOutput { frame: current, filtered }
    }

    /// Return a delivered frame's buffer to the pool.
    pub fn recycle(&self, frame: Frame) {
        if let Some(buffer) = frame.into_buffer() {
            self.pool.return_buffer(buffer);
        }
    }
}
