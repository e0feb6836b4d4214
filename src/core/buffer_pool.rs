//! # Buffer Pool
//!
//! Reusable pixel buffers for filter output.
//!
//! Filters that change pixels need a destination buffer every frame. Once the
//! sink has consumed a filtered frame its buffer comes back here, and so does
//! any frame displaced by an overwrite in the [`FrameSlot`](super::FrameSlot).
//!
//! ```text
//! ┌──────────────┐  get_buffer   ┌──────────────┐  consume  ┌──────────┐
//! │ Buffer Pool  │──────────────▶│ Filter Chain │──────────▶│   Sink   │
//! └──────────────┘               └──────────────┘           └──────────┘
//!        ▲                                                        │
//!        └──────────────────── return_buffer ─────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use camfilter::core::BufferPool;
//!
//! let pool = BufferPool::new(2);
//! let buffer = pool.get_buffer(640 * 360 * 4);
//! assert_eq!(buffer.len(), 640 * 360 * 4);
//!
//! pool.return_buffer(buffer);
//! assert_eq!(pool.stats(), (1, 2));
//! ```

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Bounded pool of byte buffers.
///
/// Buffers of any length are accepted back; [`get_buffer`](Self::get_buffer)
/// resizes a reused buffer to the requested length, so a resolution switch only
/// costs one reallocation per pooled buffer.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Mutex<VecDeque<Vec<u8>>>,
    /// Maximum number of buffers kept for reuse
    max_buffers: usize,
}

impl BufferPool {
    pub fn new(max_buffers: usize) -> Self {
        Self {
            buffers: Mutex::new(VecDeque::with_capacity(max_buffers)),
            max_buffers,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take a zero-filled buffer of exactly `len` bytes, reusing one if available.
    pub fn get_buffer(&self, len: usize) -> Vec<u8> {
        match self.lock().pop_front() {
            Some(mut buffer) => {
                buffer.clear();
                buffer.resize(len, 0);
                buffer
            }
            None => vec![0u8; len],
        }
    }

    /// Hand a buffer back. Dropped if the pool is already full.
    pub fn return_buffer(&self, buffer: Vec<u8>) {
        let mut buffers = self.lock();
        if buffers.len() < self.max_buffers {
            buffers.push_back(buffer);
        }
    }

    /// `(available_buffers, max_buffers)`
    pub fn stats(&self) -> (usize, usize) {
        (self.lock().len(), self.max_buffers)
    }

    /// Drop every pooled buffer.
    pub fn clear(&self) {
        self.lock().clear();
    }
}
