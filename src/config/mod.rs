//! # Configuration Module
//!
//! Pipeline configuration, capture profiles and filter settings.

pub mod config;

pub use config::{
    BlurConfig, CaptureConfig, CaptureProfile, CaptureSettings, DeliveryMode, FilterSettings,
    PipelineConfig, PixelationConfig,
};
