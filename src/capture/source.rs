//! # Frame Source
//!
//! Capability interface over a camera device.
//!
//! The device driver is an external collaborator; this trait is the adapter
//! boundary the controller talks to. Sources are pulled: the producer thread
//! calls [`FrameSource::next_frame`] in a loop, and the call blocks until the
//! device delivers the next frame (or a short poll interval elapses). A
//! callback-driven driver fits behind it by parking its callbacks in a channel
//! and having `next_frame` receive from it.
//!
//! ```text
//!            bind      open      next_frame*     close     release
//! Unbound ───────▶ Bound ───▶ Open ─────────▶ Open ───▶ Bound ─────▶ Unbound
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::{debug, warn};

use crate::config::CaptureConfig;
use crate::core::Frame;
use crate::error::CaptureResult;

/// Opaque identifier of a camera device as handed over by the host platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    id: String,
}

impl DeviceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// A camera producing raw frames.
///
/// All methods are called with the controller's source lock held, and never
/// concurrently. The controller only calls `close` on an open stream.
pub trait FrameSource: Send {
    /// Attach to a device. Fails with a `DeviceBind` error when the camera is
    /// unavailable or access is denied.
    fn bind(&mut self, device: &DeviceHandle) -> CaptureResult<()>;

    /// Start streaming at the requested resolution, rate and layout.
    fn open(&mut self, config: &CaptureConfig) -> CaptureResult<()>;

    /// Block until the next frame is available.
    ///
    /// `Ok(None)` means no frame arrived within the source's poll interval and
    /// the caller should simply ask again.
    fn next_frame(&mut self) -> CaptureResult<Option<Frame>>;

    /// Stop streaming. The device stays bound.
    fn close(&mut self);

    /// Detach from the device.
    fn release(&mut self);

    /// Short label for logs.
    fn name(&self) -> &str {
        "camera"
    }
}

/// A [`FrameSource`] plus the id of the capture session that has it open.
///
/// Opening and closing go through a session id so a producer that was
/// detached after a stop timeout can never close, or read from, a stream a
/// newer session opened.
pub struct SourceSlot {
    source: Box<dyn FrameSource>,
    open_session: Option<u64>,
}

impl SourceSlot {
    pub fn bind(&mut self, device: &DeviceHandle) -> CaptureResult<()> {
        self.source.bind(device)
    }

    /// Open the stream for `session`. A stream still open for an older session
    /// is closed first.
    pub fn open(&mut self, session: u64, config: &CaptureConfig) -> CaptureResult<()> {
        if let Some(stale) = self.open_session.take() {
            warn!(source = self.source.name(), stale, session, "Closing stream left open by a detached producer");
            self.source.close();
        }
        self.source.open(config)?;
        self.open_session = Some(session);
        Ok(())
    }

    pub fn is_open_for(&self, session: u64) -> bool {
        self.open_session == Some(session)
    }

    pub fn next_frame(&mut self) -> CaptureResult<Option<Frame>> {
        self.source.next_frame()
    }

    /// Close the stream if `session` still owns it.
    pub fn close(&mut self, session: u64) {
        if self.is_open_for(session) {
            self.open_session = None;
            self.source.close();
            debug!(source = self.source.name(), session, "Stream closed");
        }
    }

    pub fn release(&mut self) {
        if self.open_session.take().is_some() {
            self.source.close();
        }
        self.source.release();
    }

    pub fn name(&self) -> &str {
        self.source.name()
    }
}

struct SharedInner {
    slot: Mutex<SourceSlot>,
    release_pending: AtomicBool,
}

/// A source shared between the controller and its producer thread.
#[derive(Clone)]
pub struct SharedSource(Arc<SharedInner>);

impl SharedSource {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self(Arc::new(SharedInner {
            slot: Mutex::new(SourceSlot { source, open_session: None }),
            release_pending: AtomicBool::new(false),
        }))
    }

    /// Lock the source. A producer that panicked mid-frame leaves the source
    /// usable for `close`/`release`. A deferred release is applied first.
    pub fn lock(&self) -> MutexGuard<'_, SourceSlot> {
        let mut slot = self.0.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if self.0.release_pending.swap(false, Ordering::SeqCst) {
            debug!(source = slot.name(), "Applying deferred release");
            slot.release();
        }
        slot
    }

    /// Release the device without waiting on a producer stuck in
    /// `next_frame`. Returns `false` when the release was deferred to the
    /// next time the source is locked.
    pub fn release(&self) -> bool {
        let mut slot = match self.0.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                self.0.release_pending.store(true, Ordering::SeqCst);
                return false;
            }
        };
        self.0.release_pending.store(false, Ordering::SeqCst);
        slot.release();
        true
    }
}

impl fmt::Debug for SharedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedSource").finish()
    }
}
