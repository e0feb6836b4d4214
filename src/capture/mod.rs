//! # Capture Module
//!
//! Frame source and sink capability interfaces, the producer thread lifecycle,
//! and synthetic devices.

pub mod capture_loop;
pub mod sink;
pub mod source;
pub mod synthetic;

pub use capture_loop::{CaptureLoop, LoopAction};
pub use sink::FrameSink;
pub use source::{DeviceHandle, FrameSource, SharedSource, SourceSlot};
pub use synthetic::{EllipseSegmenter, StaticFaceDetector, TestPatternSource};
