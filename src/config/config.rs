//! # Pipeline Configuration
//!
//! Configuration structures and validation for the capture controller.
//!
//! ## Parameters
//!
//! | Parameter | Default | Description |
//! |-----------|---------|-------------|
//! | `high_profile` | 1280x720 @ 30 fps, nv21 | Used while no filter is active |
//! | `low_profile` | 640x360 @ 15 fps, rgba | Used while any filter is active |
//!
//! Each profile also carries the `orientation` stamped on its frames
//! (default `up`).
//! | `debounce_ms` | 500 | Quiet window before a filter toggle restarts capture |
//! | `delivery` | `queued` | `queued` hands frames to a processing thread, `inline` filters on the producer |
//! | `source_error_backoff_ms` | 10 | Pause after a failed `next_frame` |
//! | `start_timeout_ms` | 1000 | How long `start_capture` waits for the producer to confirm |
//! | `stop_timeout_ms` | 2000 | How long a stop waits for each thread before detaching it |
//! | `pixelation` | block 12, radius h/1.6, feather 1px, persistence 1 | Face pixelation mask |
//! | `blur` | sigma 10 | Background blur strength |
//!
//! ## Examples
//!
//! ```rust
//! use camfilter::config::{DeliveryMode, PipelineConfig};
//!
//! let config = PipelineConfig::from_json_str(r#"{ "debounce_ms": 250, "delivery": "inline" }"#)
//!     .unwrap();
//! assert_eq!(config.debounce_ms, 250);
//! assert_eq!(config.delivery, DeliveryMode::Inline);
//! // Unspecified fields keep their defaults.
//! assert_eq!(config.low_profile.width, 640);
//!
//! let capture = config.capture_config(true);
//! assert!(capture.filtering_active);
//! assert_eq!(capture.target_frame_rate, 15);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::{Orientation, PixelFormat};
use crate::error::{CaptureError, CaptureResult};

/// Resolution, rate and layout requested from the frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureProfile {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    pub pixel_format: PixelFormat,
    /// Rotation the sink applies to show frames upright, e.g. for a sensor
    /// mounted sideways.
    #[serde(default)]
    pub orientation: Orientation,
}

impl CaptureProfile {
    /// Full quality, camera-native YUV.
    pub const HIGH: Self = Self {
        width: 1280,
        height: 720,
        frame_rate: 30,
        pixel_format: PixelFormat::Nv21,
        orientation: Orientation::Up,
    };

    /// Reduced load for per-frame vision models, packed RGBA for the filters.
    pub const LOW: Self = Self {
        width: 640,
        height: 360,
        frame_rate: 15,
        pixel_format: PixelFormat::Rgba,
        orientation: Orientation::Up,
    };

    fn validate(&self, name: &str) -> CaptureResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::config(
                format!("{}.width/height", name),
                format!("{}x{}", self.width, self.height),
                "dimensions must be greater than 0",
            ));
        }
        if self.frame_rate == 0 || self.frame_rate > 120 {
            return Err(CaptureError::config(
                format!("{}.frame_rate", name),
                self.frame_rate.to_string(),
                "must be between 1 and 120",
            ));
        }
        Ok(())
    }
}

/// Where the filter chain runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// The producer thread filters and feeds the sink itself.
    Inline,
    /// Active filtering goes through the frame slot to a dedicated processing thread.
    #[default]
    Queued,
}

/// Face pixelation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelationConfig {
    /// Edge length of one pixelation block in pixels.
    pub block_size: u32,
    /// Mask radius is the face box height divided by this.
    pub radius_divisor: f32,
    /// Width of the linear fall-off at the mask edge.
    pub feather_px: f32,
    /// Frames a face stays masked after the detector stops reporting it.
    pub persistence_frames: u32,
}

impl Default for PixelationConfig {
    fn default() -> Self {
        Self {
            block_size: 12,
            radius_divisor: 1.6,
            feather_px: 1.0,
            persistence_frames: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurConfig {
    /// Gaussian sigma applied to the background copy.
    pub sigma: f32,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self { sigma: 10.0 }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub high_profile: CaptureProfile,
    pub low_profile: CaptureProfile,
    pub debounce_ms: u64,
    pub delivery: DeliveryMode,
    pub source_error_backoff_ms: u64,
    pub start_timeout_ms: u64,
    pub stop_timeout_ms: u64,
    pub pixelation: PixelationConfig,
    pub blur: BlurConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            high_profile: CaptureProfile::HIGH,
            low_profile: CaptureProfile::LOW,
            debounce_ms: 500,
            delivery: DeliveryMode::Queued,
            source_error_backoff_ms: 10,
            start_timeout_ms: 1000,
            stop_timeout_ms: 2000,
            pixelation: PixelationConfig::default(),
            blur: BlurConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a JSON document. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> CaptureResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> CaptureResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| CaptureError::io_at("load_config", path.display().to_string(), e))?;
        Self::from_json_str(&text).map_err(|e| e.with_context(format!("config file {}", path.display())))
    }

    /// Validates all parameters, naming the first offending field.
    pub fn validate(&self) -> CaptureResult<()> {
        self.high_profile.validate("high_profile")?;
        self.low_profile.validate("low_profile")?;

        if !self.low_profile.pixel_format.is_packed_4ch() {
            return Err(CaptureError::config(
                "low_profile.pixel_format",
                self.low_profile.pixel_format.as_str(),
                "filters need a packed 4-channel format (rgba or bgra)",
            ));
        }
        if self.start_timeout_ms == 0 {
            return Err(CaptureError::config(
                "start_timeout_ms",
                "0",
                "must be greater than 0",
            ));
        }
        if self.stop_timeout_ms == 0 {
            return Err(CaptureError::config(
                "stop_timeout_ms",
                "0",
                "must be greater than 0",
            ));
        }
        if self.pixelation.block_size == 0 {
            return Err(CaptureError::config(
                "pixelation.block_size",
                "0",
                "must be greater than 0",
            ));
        }
        if !(self.pixelation.radius_divisor > 0.0) {
            return Err(CaptureError::config(
                "pixelation.radius_divisor",
                self.pixelation.radius_divisor.to_string(),
                "must be a positive number",
            ));
        }
        if !(self.pixelation.feather_px >= 0.0) {
            return Err(CaptureError::config(
                "pixelation.feather_px",
                self.pixelation.feather_px.to_string(),
                "must not be negative",
            ));
        }
        if !(self.blur.sigma > 0.0) {
            return Err(CaptureError::config(
                "blur.sigma",
                self.blur.sigma.to_string(),
                "must be a positive number",
            ));
        }
        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn source_error_backoff(&self) -> Duration {
        Duration::from_millis(self.source_error_backoff_ms)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn profile(&self, filtering_active: bool) -> CaptureProfile {
        if filtering_active {
            self.low_profile
        } else {
            self.high_profile
        }
    }

    /// Derive the session config for the given filtering state.
    pub fn capture_config(&self, filtering_active: bool) -> CaptureConfig {
        let profile = self.profile(filtering_active);
        CaptureConfig {
            target_width: profile.width,
            target_height: profile.height,
            target_frame_rate: profile.frame_rate,
            pixel_format: profile.pixel_format,
            orientation: profile.orientation,
            filtering_active,
        }
    }
}

/// Per-session source configuration. Owned by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureConfig {
    pub target_width: u32,
    pub target_height: u32,
    pub target_frame_rate: u32,
    pub pixel_format: PixelFormat,
    /// Stamped on every frame the session produces.
    pub orientation: Orientation,
    pub filtering_active: bool,
}

impl CaptureConfig {
    pub fn settings(&self) -> CaptureSettings {
        CaptureSettings {
            frame_rate: self.target_frame_rate,
            width: self.target_width,
            height: self.target_height,
            pixel_format: self.pixel_format,
            orientation: self.orientation,
        }
    }
}

/// What the bridge layer reports to the video transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CaptureSettings {
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub orientation: Orientation,
}

/// Which filters the chain applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterSettings {
    pub pixelate_faces: bool,
    pub blur_background: bool,
}

impl FilterSettings {
    pub const NONE: Self = Self {
        pixelate_faces: false,
        blur_background: false,
    };

    /// True when at least one filter is enabled.
    pub fn any(&self) -> bool {
        self.pixelate_faces || self.blur_background
    }
}
