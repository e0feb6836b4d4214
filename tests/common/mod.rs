//! Common test utilities for the camfilter integration tests
//!
//! Mock sources, sinks and detectors that record what the pipeline did to
//! them, so tests can assert on thread lifecycle and delivery order without a
//! camera or vision models.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use camfilter::capture::{DeviceHandle, FrameSink, FrameSource};
use camfilter::config::{CaptureProfile, DeliveryMode, PipelineConfig};
use camfilter::core::{Frame, Orientation, PixelFormat};
use camfilter::processing::{FaceBox, FaceDetector, SegmentationMask, Segmenter};
use camfilter::{CaptureConfig, CaptureController, CaptureError, CaptureResult};

/// Small profiles so frames are cheap and tests run fast.
pub fn test_config(delivery: DeliveryMode) -> PipelineConfig {
    PipelineConfig {
        high_profile: CaptureProfile {
            width: 32,
            height: 16,
            frame_rate: 120,
            pixel_format: PixelFormat::Nv21,
            orientation: Orientation::Up,
        },
        low_profile: CaptureProfile {
            width: 16,
            height: 8,
            frame_rate: 100,
            pixel_format: PixelFormat::Rgba,
            orientation: Orientation::Up,
        },
        debounce_ms: 60,
        stop_timeout_ms: 500,
        delivery,
        ..PipelineConfig::default()
    }
}

/// Packed frame filled with one colour.
pub fn solid_frame(width: u32, height: u32, rgba: [u8; 4]) -> Frame {
    let data = rgba.repeat(width as usize * height as usize);
    Frame::new(data, width, height, PixelFormat::Rgba).expect("valid test frame")
}

/// Poll `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

/// What a [`RecordingSink`] saw for one frame.
#[derive(Debug, Clone, Copy)]
pub struct Delivery {
    pub sequence: u64,
    pub width: u32,
    pub format: PixelFormat,
    pub orientation: Orientation,
    pub at: Instant,
}

/// Sink that records every delivered frame's metadata.
#[derive(Default)]
pub struct RecordingSink {
    count: AtomicU64,
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().expect("sink lock").clone()
    }

    pub fn last(&self) -> Option<Delivery> {
        self.deliveries.lock().expect("sink lock").last().copied()
    }
}

impl FrameSink for RecordingSink {
    fn consume(&self, frame: &Frame) -> CaptureResult<()> {
        self.deliveries.lock().expect("sink lock").push(Delivery {
            sequence: frame.sequence,
            width: frame.width(),
            format: frame.format(),
            orientation: frame.orientation,
            at: Instant::now(),
        });
        self.count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Counters shared between a [`MockSource`] and the test that owns it.
#[derive(Default)]
pub struct SourceProbe {
    pub binds: AtomicUsize,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub releases: AtomicUsize,
    /// Sources currently open. Exceeding one means two producers overlapped.
    pub open_now: AtomicUsize,
    pub max_open: AtomicUsize,
    pub fail_open: AtomicBool,
    /// Extra time every `next_frame` call blocks, to simulate a stuck driver.
    pub stall_ms: AtomicU64,
    pub opened_with: Mutex<Vec<CaptureConfig>>,
}

impl SourceProbe {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn last_opened(&self) -> Option<CaptureConfig> {
        self.opened_with.lock().expect("probe lock").last().copied()
    }
}

/// Source producing solid frames at a fixed interval, reporting lifecycle
/// calls through a [`SourceProbe`]. Devices named `missing:*` fail to bind.
pub struct MockSource {
    probe: Arc<SourceProbe>,
    config: Option<CaptureConfig>,
    interval: Duration,
    sequence: u64,
}

impl MockSource {
    pub fn new(interval: Duration) -> (Self, Arc<SourceProbe>) {
        let probe = Arc::new(SourceProbe::default());
        let source = Self {
            probe: Arc::clone(&probe),
            config: None,
            interval,
            sequence: 0,
        };
        (source, probe)
    }
}

impl FrameSource for MockSource {
    fn bind(&mut self, device: &DeviceHandle) -> CaptureResult<()> {
        if device.id().starts_with("missing:") {
            return Err(CaptureError::device_bind(device.id(), "no such camera"));
        }
        self.probe.binds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn open(&mut self, config: &CaptureConfig) -> CaptureResult<()> {
        if self.probe.fail_open.load(Ordering::SeqCst) {
            return Err(CaptureError::source("camera busy"));
        }
        self.probe.opens.fetch_add(1, Ordering::SeqCst);
        let now = self.probe.open_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_open.fetch_max(now, Ordering::SeqCst);
        self.probe.opened_with.lock().expect("probe lock").push(*config);
        self.config = Some(*config);
        Ok(())
    }

    fn next_frame(&mut self) -> CaptureResult<Option<Frame>> {
        let Some(config) = self.config else {
            return Err(CaptureError::source("not open"));
        };
        thread::sleep(self.interval + Duration::from_millis(self.probe.stall_ms.load(Ordering::SeqCst)));
        let len = config.pixel_format.frame_len(config.target_width, config.target_height);
        let frame = Frame::new(vec![90; len], config.target_width, config.target_height, config.pixel_format)?
            .with_sequence(self.sequence);
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        if self.config.take().is_some() {
            self.probe.open_now.fetch_sub(1, Ordering::SeqCst);
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn release(&mut self) {
        self.close();
        self.probe.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Detector that replays a fixed script of results, then reports `fallback`.
pub struct ScriptedDetector {
    script: Vec<CaptureResult<Vec<FaceBox>>>,
    fallback: Vec<FaceBox>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedDetector {
    pub fn new(script: Vec<CaptureResult<Vec<FaceBox>>>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut script = script;
        script.reverse();
        let detector = Self { script, fallback: Vec::new(), calls: Arc::clone(&calls) };
        (detector, calls)
    }

    /// Always reports the same box.
    pub fn fixed(face: FaceBox) -> Self {
        let (mut detector, _) = Self::new(Vec::new());
        detector.fallback = vec![face];
        detector
    }
}

impl FaceDetector for ScriptedDetector {
    fn detect_faces(&mut self, _frame: &Frame) -> CaptureResult<Vec<FaceBox>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script.pop().unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

/// Segmenter returning a uniform mask and counting calls.
pub struct UniformSegmenter {
    confidence: f32,
    calls: Arc<AtomicUsize>,
}

impl UniformSegmenter {
    pub fn new(confidence: f32) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (Self { confidence, calls: Arc::clone(&calls) }, calls)
    }
}

impl Segmenter for UniformSegmenter {
    fn segment(&mut self, _frame: &Frame) -> CaptureResult<SegmentationMask> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(SegmentationMask { width: 4, height: 2, confidence: vec![self.confidence; 8] })
    }
}

/// Controller over a [`MockSource`] with the given delivery mode.
pub fn mock_controller(
    delivery: DeliveryMode,
) -> (CaptureController, Arc<SourceProbe>, Arc<RecordingSink>) {
    mock_controller_with(test_config(delivery))
}

/// Controller over a [`MockSource`] with a custom pipeline config.
pub fn mock_controller_with(
    config: PipelineConfig,
) -> (CaptureController, Arc<SourceProbe>, Arc<RecordingSink>) {
    let (source, probe) = MockSource::new(Duration::from_millis(2));
    let sink = RecordingSink::new();
    let controller = CaptureController::builder()
        .with_config(config)
        .with_source(source)
        .with_sink(Arc::clone(&sink) as Arc<dyn FrameSink>)
        .with_face_detector(ScriptedDetector::fixed(FaceBox::new(2.0, 2.0, 4.0, 4.0)))
        .with_segmenter(UniformSegmenter::new(1.0).0)
        .build()
        .expect("controller builds");
    (controller, probe, sink)
}
