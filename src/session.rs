//! # Capture Controller
//!
//! Lifecycle state machine for one camera, and frame routing from the
//! producer thread to the sink.
//!
//! ## States
//!
//! ```text
//!           init              start_capture
//!   Idle ─────────▶ Ready ─────────────────▶ Capturing
//!    ▲                ▲                          │ stop_capture
//!    │ destroy        └──────── Stopping ◀───────┘
//!    └───────────── Ready / Capturing
//! ```
//!
//! Every state-mutating call (`init`, `start_capture`, `stop_capture`,
//! `destroy`, `switch_device` and the debounced filter restart) runs under one
//! instance lock, so a stop can never race a start and at most one producer
//! thread exists per controller.
//!
//! Stopping waits at most `stop_timeout_ms` per thread. A producer still
//! blocked in the source after that is detached and the stop counts anyway:
//! the controller moves to `Ready`, and the detached thread closes its stream
//! and exits as soon as the source returns. Each session opens the source
//! under its own id, so a detached producer never touches a newer session's
//! stream and never delivers another frame.
//!
//! ## Frame Routing
//!
//! - **Filtering inactive**: the producer hands each frame straight to the sink.
//! - **Filtering active, `queued`**: the producer publishes into the
//!   [`FrameSlot`], overwriting any unclaimed frame, and a processing thread
//!   claims, filters and delivers.
//! - **Filtering active, `inline`**: the producer runs the chain itself.
//!
//! ## Filter Toggles
//!
//! [`CaptureController::set_filtering_active`] only records the request while
//! no session runs. While capturing it arms a debounce timer; when the timer
//! fires the controller compares the latest request with the profile the
//! session runs at and restarts capture only if they differ. Toggling back
//! within the window therefore causes no restart at all.
//!
//! ## Status Codes
//!
//! The bridge-facing operations return `0` on success and a negative
//! [`status code`](crate::error::CaptureError::status_code) on failure. The
//! `try_*` variants return the underlying [`CaptureResult`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::capture::{CaptureLoop, DeviceHandle, FrameSink, FrameSource, LoopAction, SharedSource};
use crate::config::{CaptureConfig, CaptureSettings, DeliveryMode, FilterSettings, PipelineConfig};
use crate::core::{BufferPool, Frame, FrameSlot, PipelineStats, StatsSnapshot};
use crate::debounce::Debouncer;
use crate::error::{CaptureError, CaptureResult, to_status};
use crate::processing::{FaceDetector, FilterChain, Segmenter};

/// How long the processing thread waits on the slot before rechecking its stop flag.
const CLAIM_POLL: Duration = Duration::from_millis(50);
const POOL_BUFFERS: usize = 4;

/// Lifecycle state of a [`CaptureController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    /// No device bound.
    Idle,
    /// Device bound, not capturing.
    Ready,
    /// Producer running, frames flowing.
    Capturing,
    /// Join in progress.
    Stopping,
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CaptureState::Idle => "Idle",
            CaptureState::Ready => "Ready",
            CaptureState::Capturing => "Capturing",
            CaptureState::Stopping => "Stopping",
        };
        f.write_str(name)
    }
}

/// Everything guarded by the instance lock.
struct Session {
    state: CaptureState,
    device: Option<DeviceHandle>,
    /// Config of the running session, or of the next one while not capturing.
    config: CaptureConfig,
    /// Latest filtering request.
    desired_filtering: bool,
    producer: Option<CaptureLoop>,
    processor: Option<CaptureLoop>,
}

/// Handles the producer and processing threads need.
#[derive(Clone)]
struct Route {
    sink: Arc<dyn FrameSink>,
    chain: Arc<Mutex<FilterChain>>,
    slot: Arc<FrameSlot>,
    pool: Arc<BufferPool>,
    stats: Arc<PipelineStats>,
}

impl Route {
    fn chain(&self) -> MutexGuard<'_, FilterChain> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, frame: Frame, filtered: bool) {
        match self.sink.consume(&frame) {
            Ok(()) => self.stats.record_delivered(filtered),
            Err(e) => {
                self.stats.record_sink_error();
                warn!(sequence = frame.sequence, error = %e, "Sink rejected frame");
            }
        }
        if let Some(buffer) = frame.into_buffer() {
            self.pool.return_buffer(buffer);
        }
    }

    fn filter_and_deliver(&self, frame: Frame) {
        let output = self.chain().process(frame);
        self.deliver(output.frame, output.filtered);
    }

    fn publish(&self, frame: Frame) {
        let displaced = self.slot.publish(frame);
        self.stats.record_published(displaced.is_some());
        if let Some(buffer) = displaced.and_then(Frame::into_buffer) {
            self.pool.return_buffer(buffer);
        }
    }
}

struct Shared {
    session: Mutex<Session>,
    pipeline: PipelineConfig,
    source: SharedSource,
    route: Route,
    /// Id handed to the next producer; see [`SourceSlot::open`](crate::capture::SourceSlot::open).
    next_session: AtomicU64,
}

/// Producer loop state. Closes the stream on the producer thread when the
/// loop ends, whether it stopped, was detached or panicked.
struct OpenStream {
    source: SharedSource,
    session: u64,
}

impl Drop for OpenStream {
    fn drop(&mut self) {
        self.source.lock().close(self.session);
    }
}

/// Warn about every way `config` differs from what the sink declared.
/// Returns `true` when the sink gets exactly the layout it expects.
fn check_sink_layout(sink: &dyn FrameSink, config: &CaptureConfig) -> bool {
    let mut matches = true;
    if let Some(expected) = sink.expected_format() {
        if expected != config.pixel_format {
            warn!(
                expected = %expected,
                producing = %config.pixel_format,
                "Sink expects a different pixel format"
            );
            matches = false;
        }
    }
    let expected = sink.expected_orientation();
    if expected != config.orientation {
        warn!(
            expected = ?expected,
            producing = ?config.orientation,
            "Sink expects a different orientation"
        );
        matches = false;
    }
    matches
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bind_locked(&self, session: &mut Session, device: &DeviceHandle) -> CaptureResult<()> {
        self.source
            .lock()
            .bind(device)
            .map_err(|e| e.with_operation("bind"))?;
        session.device = Some(device.clone());
        session.state = CaptureState::Ready;
        info!(device = %device, "Device bound");
        Ok(())
    }

    fn release_locked(&self, session: &mut Session) {
        let released = self.source.release();
        if let Some(device) = session.device.take() {
            if released {
                info!(device = %device, "Device released");
            } else {
                info!(device = %device, "Device release deferred until the source is free");
            }
        }
        session.state = CaptureState::Idle;
    }

    fn start_locked(&self, session: &mut Session) -> CaptureResult<()> {
        match session.state {
            CaptureState::Ready => {}
            CaptureState::Capturing => {
                debug!("start_capture while capturing ignored");
                return Ok(());
            }
            state => {
                return Err(CaptureError::state(
                    state.to_string(),
                    "start_capture",
                    "no device bound",
                )
                .with_recovery_suggestion("call init with a device handle first"));
            }
        }

        let config = self.pipeline.capture_config(session.desired_filtering);
        session.config = config;
        check_sink_layout(self.route.sink.as_ref(), &config);

        let queued = config.filtering_active && self.pipeline.delivery == DeliveryMode::Queued;
        let processor = if queued {
            self.route.slot.reopen();
            Some(self.spawn_processor()?)
        } else {
            None
        };

        let producer = match self.spawn_producer(config) {
            Ok(producer) => producer,
            Err(e) => {
                if let Some(processor) = processor {
                    self.route.slot.close();
                    self.stop_loop(processor);
                }
                return Err(e.with_operation("start_capture"));
            }
        };

        session.producer = Some(producer);
        session.processor = processor;
        session.state = CaptureState::Capturing;
        info!(
            width = config.target_width,
            height = config.target_height,
            fps = config.target_frame_rate,
            format = %config.pixel_format,
            filtering = config.filtering_active,
            delivery = ?self.pipeline.delivery,
            "Capture started"
        );
        Ok(())
    }

    fn spawn_producer(&self, config: CaptureConfig) -> CaptureResult<CaptureLoop> {
        let session_id = self.next_session.fetch_add(1, Ordering::SeqCst);
        let open_source = self.source.clone();
        let route = self.route.clone();
        let backoff = self.pipeline.source_error_backoff();
        let delivery = self.pipeline.delivery;

        CaptureLoop::spawn(
            "capture-producer",
            self.pipeline.start_timeout(),
            move || {
                open_source.lock().open(session_id, &config)?;
                Ok(OpenStream { source: open_source, session: session_id })
            },
            move |stream: &mut OpenStream, stop: &AtomicBool| {
                let next = {
                    let mut source = stream.source.lock();
                    if stop.load(Ordering::SeqCst) || !source.is_open_for(stream.session) {
                        return LoopAction::Stop;
                    }
                    source.next_frame()
                };
                // Stopped while blocked in the source: the frame is dropped.
                if stop.load(Ordering::SeqCst) {
                    if let Some(buffer) = next.ok().flatten().and_then(Frame::into_buffer) {
                        route.pool.return_buffer(buffer);
                    }
                    return LoopAction::Stop;
                }
                match next {
                    Ok(Some(frame)) => {
                        route.stats.record_captured();
                        let frame = frame.with_orientation(config.orientation);
                        match (config.filtering_active, delivery) {
                            (false, _) => route.deliver(frame, false),
                            (true, DeliveryMode::Inline) => route.filter_and_deliver(frame),
                            (true, DeliveryMode::Queued) => route.publish(frame),
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        route.stats.record_source_error();
                        warn!(error = %e, "Frame source error");
                        std::thread::sleep(backoff);
                    }
                }
                LoopAction::Continue
            },
        )
    }

    fn spawn_processor(&self) -> CaptureResult<CaptureLoop> {
        let route = self.route.clone();
        CaptureLoop::spawn(
            "capture-processing",
            self.pipeline.start_timeout(),
            || Ok(()),
            move |_, _| {
                if let Some(frame) = route.slot.claim_timeout(CLAIM_POLL) {
                    route.filter_and_deliver(frame);
                    LoopAction::Continue
                } else if route.slot.is_closed() {
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            },
        )
    }

    /// Stop one loop within the configured timeout. Never fails: a panicked
    /// or timed-out thread is logged and counted as stopped.
    fn stop_loop(&self, mut lp: CaptureLoop) {
        match lp.stop(self.pipeline.stop_timeout()) {
            Ok(true) => {}
            Ok(false) => warn!(name = lp.name(), "Thread panicked; treating it as stopped"),
            Err(e) => {
                self.route.stats.record_stop_timeout();
                e.log("stop_capture");
            }
        }
    }

    /// Stop both threads. The producer closes the source on its way out.
    fn stop_locked(&self, session: &mut Session) {
        if session.state != CaptureState::Capturing {
            return;
        }
        session.state = CaptureState::Stopping;

        if let Some(producer) = session.producer.take() {
            self.stop_loop(producer);
        }
        self.route.slot.close();
        if let Some(processor) = session.processor.take() {
            self.stop_loop(processor);
        }
        while let Some(frame) = self.route.slot.try_claim() {
            if let Some(buffer) = frame.into_buffer() {
                self.route.pool.return_buffer(buffer);
            }
        }

        session.state = CaptureState::Ready;
        info!("Capture stopped");
    }

    /// Debounced restart: converge the running profile on the latest request.
    fn apply_filter_toggle(&self) {
        let mut session = self.lock();
        if session.state != CaptureState::Capturing
            || session.desired_filtering == session.config.filtering_active
        {
            debug!("Debounced toggle needs no restart");
            return;
        }

        info!(
            filtering = session.desired_filtering,
            "Restarting capture for filter toggle"
        );
        self.stop_locked(&mut session);
        self.route.stats.record_restart();
        if let Err(e) = self.start_locked(&mut session) {
            e.log("filter_toggle_restart");
        }
    }
}

/// Owns one camera's capture lifecycle.
pub struct CaptureController {
    shared: Arc<Shared>,
    debouncer: Debouncer,
}

impl CaptureController {
    pub fn builder() -> CaptureControllerBuilder {
        CaptureControllerBuilder::new()
    }

    /// Bind a device: `Idle → Ready`.
    pub fn try_init(&self, device: &DeviceHandle) -> CaptureResult<()> {
        let mut session = self.shared.lock();
        if session.state != CaptureState::Idle {
            return Err(CaptureError::state(
                session.state.to_string(),
                "init",
                "a device is already bound",
            )
            .with_recovery_suggestion("use switch_device to change cameras"));
        }
        self.shared.bind_locked(&mut session, device)
    }

    /// Bind a device. Returns a status code; the controller stays `Idle` on failure.
    pub fn init(&self, device: &DeviceHandle) -> i32 {
        let result = self.try_init(device);
        if let Err(e) = &result {
            e.log("init");
        }
        to_status(result)
    }

    /// `Ready → Capturing`. Returns once the producer has confirmed it started.
    pub fn try_start_capture(&self) -> CaptureResult<()> {
        let mut session = self.shared.lock();
        self.shared.start_locked(&mut session)
    }

    pub fn start_capture(&self) -> i32 {
        let result = self.try_start_capture();
        if let Err(e) = &result {
            e.log("start_capture");
        }
        to_status(result)
    }

    /// `Capturing → Stopping → Ready`. Waits for both threads up to the stop
    /// timeout each; no frame reaches the sink after this returns. A no-op
    /// outside `Capturing`.
    pub fn try_stop_capture(&self) -> CaptureResult<()> {
        let mut session = self.shared.lock();
        self.shared.stop_locked(&mut session);
        Ok(())
    }

    pub fn stop_capture(&self) -> i32 {
        to_status(self.try_stop_capture())
    }

    /// Stop capture if running and release the device. Idempotent.
    pub fn destroy(&self) {
        self.debouncer.cancel();
        let mut session = self.shared.lock();
        if session.state == CaptureState::Idle {
            return;
        }
        self.shared.stop_locked(&mut session);
        self.shared.release_locked(&mut session);
        self.shared.route.chain().reset_state();
    }

    /// Request the low-resource profile (`true`) or the high-quality one.
    ///
    /// Without a running session the request is recorded immediately. While
    /// capturing, the restart is debounced and only the last request in the
    /// window is applied.
    pub fn set_filtering_active(&self, active: bool) {
        let mut session = self.shared.lock();
        session.desired_filtering = active;

        match session.state {
            CaptureState::Idle | CaptureState::Ready => {
                self.debouncer.cancel();
                session.config = self.shared.pipeline.capture_config(active);
                debug!(filtering = active, "Filtering recorded");
            }
            CaptureState::Capturing | CaptureState::Stopping => {
                let weak: Weak<Shared> = Arc::downgrade(&self.shared);
                self.debouncer.schedule(move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.apply_filter_toggle();
                    }
                });
                debug!(
                    filtering = active,
                    delay_ms = self.debouncer.delay().as_millis() as u64,
                    "Filter toggle scheduled"
                );
            }
        }
    }

    /// Enable or disable individual filters and switch profiles to match.
    pub fn set_filters(&self, settings: FilterSettings) {
        self.shared.route.chain().set_settings(settings);
        self.set_filtering_active(settings.any());
    }

    pub fn filter_settings(&self) -> FilterSettings {
        self.shared.route.chain().settings()
    }

    /// Latest filtering request, applied or pending.
    pub fn is_filtering_active(&self) -> bool {
        self.shared.lock().desired_filtering
    }

    /// Move to another camera, resuming capture if it was running.
    ///
    /// The face memory is cleared: boxes from one camera mean nothing on another.
    pub fn try_switch_device(&self, device: &DeviceHandle) -> CaptureResult<()> {
        let mut session = self.shared.lock();
        let was_capturing = session.state == CaptureState::Capturing;

        self.shared.stop_locked(&mut session);
        if session.state != CaptureState::Idle {
            self.shared.release_locked(&mut session);
        }
        self.shared.route.chain().reset_state();

        self.shared.bind_locked(&mut session, device)?;
        if was_capturing {
            self.shared.route.stats.record_restart();
            self.shared.start_locked(&mut session)?;
        }
        Ok(())
    }

    pub fn switch_device(&self, device: &DeviceHandle) -> i32 {
        let result = self.try_switch_device(device);
        if let Err(e) = &result {
            e.log("switch_device");
        }
        to_status(result)
    }

    /// Clear the last-known-face memory.
    pub fn reset_filter_state(&self) {
        self.shared.route.chain().reset_state();
    }

    /// Frame rate, size and layout of the current (or next) session.
    pub fn get_capture_settings(&self) -> CaptureSettings {
        self.shared.lock().config.settings()
    }

    pub fn capture_config(&self) -> CaptureConfig {
        self.shared.lock().config
    }

    pub fn state(&self) -> CaptureState {
        self.shared.lock().state
    }

    pub fn device(&self) -> Option<DeviceHandle> {
        self.shared.lock().device.clone()
    }

    /// True while a producer thread is alive.
    pub fn producer_running(&self) -> bool {
        self.shared
            .lock()
            .producer
            .as_ref()
            .is_some_and(CaptureLoop::is_running)
    }

    /// True while a debounced filter toggle is waiting to fire.
    pub fn toggle_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.route.stats.snapshot()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.pipeline
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Builder for [`CaptureController`].
pub struct CaptureControllerBuilder {
    config: PipelineConfig,
    source: Option<Box<dyn FrameSource>>,
    sink: Option<Arc<dyn FrameSink>>,
    face_detector: Option<Box<dyn FaceDetector>>,
    segmenter: Option<Box<dyn Segmenter>>,
}

impl CaptureControllerBuilder {
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            source: None,
            sink: None,
            face_detector: None,
            segmenter: None,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_source<S: FrameSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn FrameSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_face_detector<D: FaceDetector + 'static>(mut self, detector: D) -> Self {
        self.face_detector = Some(Box::new(detector));
        self
    }

    pub fn with_segmenter<S: Segmenter + 'static>(mut self, segmenter: S) -> Self {
        self.segmenter = Some(Box::new(segmenter));
        self
    }

    pub fn build(self) -> CaptureResult<CaptureController> {
        self.config.validate()?;
        let source = self
            .source
            .ok_or_else(|| CaptureError::config("source", "none", "a frame source is required"))?;
        let sink = self
            .sink
            .ok_or_else(|| CaptureError::config("sink", "none", "a frame sink is required"))?;

        let pool = Arc::new(BufferPool::new(POOL_BUFFERS));
        let stats = Arc::new(PipelineStats::new());
        let chain = FilterChain::new(
            &self.config,
            self.face_detector,
            self.segmenter,
            Arc::clone(&pool),
            Arc::clone(&stats),
        );
        let debouncer = Debouncer::new("filter-toggle", self.config.debounce())?;

        let session = Session {
            state: CaptureState::Idle,
            device: None,
            config: self.config.capture_config(false),
            desired_filtering: false,
            producer: None,
            processor: None,
        };

        Ok(CaptureController {
            shared: Arc::new(Shared {
                session: Mutex::new(session),
                source: SharedSource::new(source),
                route: Route {
                    sink,
                    chain: Arc::new(Mutex::new(chain)),
                    slot: Arc::new(FrameSlot::new()),
                    pool,
                    stats,
                },
                pipeline: self.config,
                next_session: AtomicU64::new(1),
            }),
            debouncer,
        })
    }
}

impl Default for CaptureControllerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{EllipseSegmenter, StaticFaceDetector, TestPatternSource};
    use crate::config::CaptureProfile;
    use crate::core::{Orientation, PixelFormat};
    use crate::error::Recoverable;
    use crate::error::{STATUS_DEVICE_BIND, STATUS_OK, STATUS_STATE};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::thread;

    #[derive(Default)]
    struct CountingSink(AtomicU64);

    impl FrameSink for CountingSink {
        fn consume(&self, _frame: &Frame) -> CaptureResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn small_config() -> PipelineConfig {
        PipelineConfig {
            high_profile: CaptureProfile { width: 32, height: 16, frame_rate: 120, ..CaptureProfile::HIGH },
            low_profile: CaptureProfile { width: 16, height: 8, frame_rate: 120, ..CaptureProfile::LOW },
            debounce_ms: 40,
            ..PipelineConfig::default()
        }
    }

    fn controller(sink: Arc<CountingSink>) -> CaptureController {
        CaptureController::builder()
            .with_config(small_config())
            .with_source(TestPatternSource::new())
            .with_sink(sink)
            .with_face_detector(StaticFaceDetector::new())
            .with_segmenter(EllipseSegmenter::new(8, 4))
            .build()
            .unwrap()
    }

    #[test]
    fn test_lifecycle_transitions() {
        let sink = Arc::new(CountingSink::default());
        let ctl = controller(Arc::clone(&sink));
        assert_eq!(ctl.state(), CaptureState::Idle);
        assert_eq!(ctl.start_capture(), STATUS_STATE);

        assert_eq!(ctl.init(&DeviceHandle::new("test:0")), STATUS_OK);
        assert_eq!(ctl.state(), CaptureState::Ready);
        assert_eq!(ctl.start_capture(), STATUS_OK);
        assert_eq!(ctl.state(), CaptureState::Capturing);
        assert!(ctl.producer_running());
        // Second start is a no-op.
        assert_eq!(ctl.start_capture(), STATUS_OK);

        thread::sleep(Duration::from_millis(50));
        assert_eq!(ctl.stop_capture(), STATUS_OK);
        assert_eq!(ctl.state(), CaptureState::Ready);
        assert!(!ctl.producer_running());
        assert!(sink.0.load(Ordering::SeqCst) > 0);

        ctl.destroy();
        assert_eq!(ctl.state(), CaptureState::Idle);
        ctl.destroy();
        assert_eq!(ctl.state(), CaptureState::Idle);
    }

    #[test]
    fn test_bind_failure_keeps_idle() {
        let ctl = controller(Arc::new(CountingSink::default()));
        assert_eq!(ctl.init(&DeviceHandle::new("usb:404")), STATUS_DEVICE_BIND);
        assert_eq!(ctl.state(), CaptureState::Idle);
        assert!(ctl.device().is_none());
    }

    #[test]
    fn test_toggle_while_idle_is_immediate() {
        let ctl = controller(Arc::new(CountingSink::default()));
        ctl.set_filtering_active(true);
        assert!(!ctl.toggle_pending());
        let settings = ctl.get_capture_settings();
        assert_eq!((settings.width, settings.height), (16, 8));
        assert_eq!(settings.pixel_format, PixelFormat::Rgba);
    }

    #[test]
    fn test_set_filters_updates_chain_and_profile() {
        let ctl = controller(Arc::new(CountingSink::default()));
        ctl.set_filters(FilterSettings { pixelate_faces: true, blur_background: false });
        assert!(ctl.is_filtering_active());
        assert!(ctl.filter_settings().pixelate_faces);

        ctl.set_filters(FilterSettings::NONE);
        assert!(!ctl.is_filtering_active());
        assert_eq!(ctl.get_capture_settings().frame_rate, 120);
        assert_eq!(ctl.get_capture_settings().pixel_format, PixelFormat::Nv21);
    }

    struct DeclaredSink {
        format: Option<PixelFormat>,
        orientation: Orientation,
    }

    impl FrameSink for DeclaredSink {
        fn consume(&self, _frame: &Frame) -> CaptureResult<()> {
            Ok(())
        }

        fn expected_format(&self) -> Option<PixelFormat> {
            self.format
        }

        fn expected_orientation(&self) -> Orientation {
            self.orientation
        }
    }

    #[test]
    fn test_sink_layout_checks_format_and_orientation() {
        let mut config = small_config().capture_config(true);
        let rgba_up = DeclaredSink { format: Some(PixelFormat::Rgba), orientation: Orientation::Up };
        assert!(check_sink_layout(&rgba_up, &config));

        let any_format = DeclaredSink { format: None, orientation: Orientation::Up };
        assert!(check_sink_layout(&any_format, &config));

        config.orientation = Orientation::Left;
        assert!(!check_sink_layout(&rgba_up, &config));

        let nv21_left = DeclaredSink { format: Some(PixelFormat::Nv21), orientation: Orientation::Left };
        assert!(!check_sink_layout(&nv21_left, &config));
    }

    struct RejectingSink(AtomicU64);

    impl FrameSink for RejectingSink {
        fn consume(&self, _frame: &Frame) -> CaptureResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(CaptureError::sink("transport closed"))
        }
    }

    #[test]
    fn test_sink_errors_are_counted_not_fatal() {
        let sink = Arc::new(RejectingSink(AtomicU64::new(0)));
        let ctl = CaptureController::builder()
            .with_config(small_config())
            .with_source(TestPatternSource::new())
            .with_sink(Arc::clone(&sink) as Arc<dyn FrameSink>)
            .build()
            .unwrap();
        assert_eq!(ctl.init(&DeviceHandle::new("test:0")), STATUS_OK);
        assert_eq!(ctl.start_capture(), STATUS_OK);
        thread::sleep(Duration::from_millis(60));
        assert_eq!(ctl.state(), CaptureState::Capturing);
        assert_eq!(ctl.stop_capture(), STATUS_OK);

        let stats = ctl.stats();
        assert!(stats.sink_errors > 0);
        assert_eq!(stats.sink_errors, sink.0.load(Ordering::SeqCst));
        assert_eq!(stats.delivered, 0);
        assert!(CaptureError::sink("transport closed").is_recoverable());
    }

    #[test]
    fn test_builder_requires_source_and_sink() {
        let err = CaptureController::builder().build().err().unwrap();
        assert_eq!(err.category(), "config");
    }
}
