//! # Core Infrastructure Module
//!
//! Frame type, the single-slot producer/consumer exchange, buffer recycling
//! and pipeline counters.

pub mod buffer_pool;
pub mod frame;
pub mod frame_slot;
pub mod stats;

pub use buffer_pool::BufferPool;
pub use frame::{Frame, Orientation, PixelFormat};
pub use frame_slot::{FrameSlot, SlotStats};
pub use stats::{PipelineStats, StatsSnapshot};
