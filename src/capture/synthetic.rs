//! Synthetic devices for the demo binary and for tests.
//!
//! [`TestPatternSource`] renders a moving gradient at whatever profile it is
//! opened with and paces itself to the requested frame rate.
//! [`StaticFaceDetector`] reports one face that drifts across the frame, and
//! [`EllipseSegmenter`] reports a centred foreground ellipse at a fixed model
//! resolution, so the pipeline can be exercised without a camera or models.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::source::{DeviceHandle, FrameSource};
use crate::config::CaptureConfig;
use crate::core::{Frame, PixelFormat};
use crate::error::{CaptureError, CaptureResult};
use crate::processing::{FaceBox, FaceDetector, SegmentationMask, Segmenter};

/// Device ids accepted by [`TestPatternSource`] start with this prefix.
pub const TEST_DEVICE_PREFIX: &str = "test:";

#[derive(Debug, Clone, Copy)]
struct OpenStream {
    config: CaptureConfig,
    interval: Duration,
    next_due: Instant,
}

/// Gradient test pattern with a vertical bar moving one step per frame.
#[derive(Debug, Default)]
pub struct TestPatternSource {
    device: Option<DeviceHandle>,
    stream: Option<OpenStream>,
    sequence: u64,
}

impl TestPatternSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device(&self) -> Option<&DeviceHandle> {
        self.device.as_ref()
    }

    fn render(config: &CaptureConfig, sequence: u64) -> Vec<u8> {
        let (w, h) = (config.target_width, config.target_height);
        let bar = (sequence as u32).wrapping_mul(8) % w.max(1);
        let mut data = vec![0u8; config.pixel_format.frame_len(w, h)];

        match config.pixel_format {
            PixelFormat::Rgba | PixelFormat::Bgra => {
                for (i, px) in data.chunks_exact_mut(4).enumerate() {
                    let (x, y) = (i as u32 % w, i as u32 / w);
                    let r = (x * 255 / w.max(1)) as u8;
                    let g = (y * 255 / h.max(1)) as u8;
                    let b = if x.abs_diff(bar) < 4 { 255 } else { 64 };
                    let (c0, c2) = if config.pixel_format == PixelFormat::Rgba { (r, b) } else { (b, r) };
                    px.copy_from_slice(&[c0, g, c2, 255]);
                }
            }
            PixelFormat::Nv21 => {
                let luma = (w * h) as usize;
                for (i, y) in data[..luma].iter_mut().enumerate() {
                    let x = i as u32 % w;
                    *y = if x.abs_diff(bar) < 4 { 235 } else { (x * 219 / w.max(1) + 16) as u8 };
                }
                data[luma..].fill(128);
            }
        }
        data
    }
}

impl FrameSource for TestPatternSource {
    fn bind(&mut self, device: &DeviceHandle) -> CaptureResult<()> {
        if !device.id().starts_with(TEST_DEVICE_PREFIX) {
            return Err(CaptureError::device_bind(
                device.id(),
                "not a test-pattern device",
            )
            .with_recovery_suggestion(format!("use a device id starting with '{}'", TEST_DEVICE_PREFIX)));
        }
        info!(device = %device, "Test pattern bound");
        self.device = Some(device.clone());
        Ok(())
    }

    fn open(&mut self, config: &CaptureConfig) -> CaptureResult<()> {
        if self.device.is_none() {
            return Err(CaptureError::source("open called before bind"));
        }
        let interval = Duration::from_secs(1) / config.target_frame_rate.max(1);
        debug!(
            width = config.target_width,
            height = config.target_height,
            fps = config.target_frame_rate,
            format = %config.pixel_format,
            "Test pattern opened"
        );
        self.stream = Some(OpenStream {
            config: *config,
            interval,
            next_due: Instant::now(),
        });
        Ok(())
    }

    fn next_frame(&mut self) -> CaptureResult<Option<Frame>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| CaptureError::source("test pattern is not open"))?;

        let now = Instant::now();
        if stream.next_due > now {
            thread::sleep(stream.next_due - now);
        }
        stream.next_due = stream.next_due.max(now) + stream.interval;

        let config = stream.config;
        let data = Self::render(&config, self.sequence);
        let frame = Frame::new(data, config.target_width, config.target_height, config.pixel_format)?
            .with_sequence(self.sequence);
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.stream = None;
    }

    fn release(&mut self) {
        self.stream = None;
        self.device = None;
    }

    fn name(&self) -> &str {
        "test-pattern"
    }
}

/// Reports a single face box that moves horizontally each call.
#[derive(Debug, Default)]
pub struct StaticFaceDetector {
    calls: u64,
}

impl StaticFaceDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FaceDetector for StaticFaceDetector {
    fn detect_faces(&mut self, frame: &Frame) -> CaptureResult<Vec<FaceBox>> {
        let (w, h) = (frame.width() as f32, frame.height() as f32);
        let size = h / 3.0;
        let travel = (w - size).max(1.0);
        let x = (self.calls as f32 * 4.0) % travel;
        self.calls += 1;
        Ok(vec![FaceBox::new(x, h / 4.0, size, size)])
    }

    fn name(&self) -> &str {
        "static-face"
    }
}

/// Foreground ellipse centred in the frame, reported at model resolution.
#[derive(Debug)]
pub struct EllipseSegmenter {
    width: u32,
    height: u32,
}

impl EllipseSegmenter {
    /// Segmenter with a fixed internal resolution.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: width.max(1), height: height.max(1) }
    }
}

impl Default for EllipseSegmenter {
    fn default() -> Self {
        Self::new(256, 144)
    }
}

impl Segmenter for EllipseSegmenter {
    fn segment(&mut self, _frame: &Frame) -> CaptureResult<SegmentationMask> {
        let (w, h) = (self.width as f32, self.height as f32);
        let (rx, ry) = (w * 0.3, h * 0.45);
        let confidence = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .map(|(x, y)| {
                let dx = (x as f32 + 0.5 - w / 2.0) / rx;
                let dy = (y as f32 + 0.5 - h / 2.0) / ry;
                if dx * dx + dy * dy <= 1.0 { 1.0 } else { 0.0 }
            })
            .collect();
        Ok(SegmentationMask { width: self.width, height: self.height, confidence })
    }

    fn name(&self) -> &str {
        "ellipse"
    }
}
