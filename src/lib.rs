//! # Camera Filter Pipeline
//!
//! Capture controller for a single camera feeding a video transport, with an
//! optional per-frame filter chain (face pixelation, background blur).
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `core`: frame type, single-slot frame exchange, buffer pool, counters
//! - `capture`: frame source / sink interfaces and the producer thread lifecycle
//! - `processing`: detector interfaces, the two filters and the chain that orders them
//! - `session`: the capture controller state machine and frame routing
//! - `debounce`: cancelable delayed restarts for filter toggles
//! - `config`: pipeline configuration and validation
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │  Source  │──▶│ Frame Slot │──▶│ Filter Chain │──▶│   Sink   │
//! │ (camera) │   │ drop-oldest│   │ pixelate→blur│   │(transport)│
//! └──────────┘   └────────────┘   └──────────────┘   └──────────┘
//!       │                                                  ▲
//!       └────────────── filtering inactive ────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use camfilter::capture::{DeviceHandle, FrameSink, TestPatternSource};
//! use camfilter::core::Frame;
//! use camfilter::{CaptureController, CaptureResult, FilterSettings};
//!
//! struct Discard;
//! impl FrameSink for Discard {
//!     fn consume(&self, _frame: &Frame) -> CaptureResult<()> {
//!         Ok(())
//!     }
//! }
//!
//! # fn main() -> CaptureResult<()> {
//! let controller = CaptureController::builder()
//!     .with_source(TestPatternSource::new())
//!     .with_sink(Arc::new(Discard))
//!     .build()?;
//!
//! assert_eq!(controller.init(&DeviceHandle::new("test:0")), 0);
//! assert_eq!(controller.start_capture(), 0);
//! controller.set_filters(FilterSettings { pixelate_faces: true, blur_background: false });
//! // ... after the debounce window the session runs at the low profile ...
//! controller.stop_capture();
//! controller.destroy();
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod core;
pub mod debounce;
pub mod error;
pub mod processing;
pub mod session;

pub use config::{CaptureConfig, CaptureSettings, FilterSettings, PipelineConfig};
pub use error::{CaptureError, CaptureResult, Recoverable, STATUS_OK};
pub use session::{CaptureController, CaptureControllerBuilder, CaptureState};
