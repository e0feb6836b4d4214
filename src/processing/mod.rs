//! # Processing Module
//!
//! Per-frame filters and the chain that orders them.

pub mod blur;
pub mod chain;
pub mod detectors;
pub mod pixelate;

pub use blur::BackgroundBlurFilter;
pub use chain::{ChainOutput, FilterChain, FilterContext, FrameFilter};
pub use detectors::{FaceBox, FaceDetector, SegmentationMask, Segmenter};
pub use pixelate::PixelationFilter;
