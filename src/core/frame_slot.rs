//! # Single-Slot Frame Exchange
//!
//! Connects one producer to one consumer through a slot that holds at most one
//! pending [`Frame`].
//!
//! ```text
//! producer ──publish──▶ [ slot ] ──claim──▶ consumer
//!                          │
//!                          └── displaced frame handed back to the producer
//! ```
//!
//! `publish` never blocks: an unclaimed frame is overwritten and returned to the
//! caller so its buffer can be recycled. `claim` takes the pending frame out of
//! the slot, so no frame is ever observed by two claims.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use super::frame::Frame;

#[derive(Debug, Default)]
struct SlotState {
    pending: Option<Frame>,
    closed: bool,
}

/// Counters describing slot traffic since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub published: u64,
    pub overwritten: u64,
    pub claimed: u64,
}

/// Drop-oldest single-slot exchange.
#[derive(Debug, Default)]
pub struct FrameSlot {
    state: Mutex<SlotState>,
    ready: Condvar,
    published: AtomicU64,
    overwritten: AtomicU64,
    claimed: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        // Slot state stays consistent across a panicking holder.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `frame` as the pending frame.
    ///
    /// Returns the unclaimed frame it displaced, if any. Frames published after
    /// [`close`](Self::close) are handed straight back.
    pub fn publish(&self, frame: Frame) -> Option<Frame> {
        let mut state = self.lock();
        if state.closed {
            return Some(frame);
        }
        let displaced = state.pending.replace(frame);
        drop(state);

        self.published.fetch_add(1, Ordering::Relaxed);
        if let Some(old) = &displaced {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
            trace!(sequence = old.sequence, "Overwrote unclaimed frame");
        }
        self.ready.notify_one();
        displaced
    }

    /// Take the pending frame without waiting.
    pub fn try_claim(&self) -> Option<Frame> {
        let frame = self.lock().pending.take();
        if frame.is_some() {
            self.claimed.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Wait until a frame is pending and take it.
    ///
    /// Returns `None` once the slot is closed and drained.
    pub fn claim(&self) -> Option<Frame> {
        let mut state = self.lock();
        loop {
            if let Some(frame) = state.pending.take() {
                self.claimed.fetch_add(1, Ordering::Relaxed);
                return Some(frame);
            }
            if state.closed {
                return None;
            }
            state = self
                .ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`claim`](Self::claim) but gives up after `timeout`.
    pub fn claim_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(frame) = state.pending.take() {
                self.claimed.fetch_add(1, Ordering::Relaxed);
                return Some(frame);
            }
            let now = Instant::now();
            if state.closed || now >= deadline {
                return None;
            }
            state = self
                .ready
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Refuse further publishes and wake every waiting consumer.
    ///
    /// A frame already pending stays claimable so it can be recycled.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Accept publishes again after [`close`](Self::close).
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn has_pending(&self) -> bool {
        self.lock().pending.is_some()
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            published: self.published.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
            claimed: self.claimed.load(Ordering::Relaxed),
        }
    }
}
