//! # Error Handling
//!
//! Error types for the capture controller and filter pipeline.
//!
//! ## Architecture
//!
//! - **`CaptureError`**: one enum per failure family, each carrying an [`ErrorContext`]
//! - **Status codes**: [`CaptureError::status_code`] maps every family onto the
//!   integer contract used at the bridge boundary (`0` success, negative failure)
//! - **Classification**: [`Recoverable`] marks failures the pipeline absorbs locally
//!   (detector misses, filter errors, sink errors) instead of surfacing them
//!
//! ## Usage
//!
//! ```rust
//! use camfilter::error::{CaptureError, Recoverable, STATUS_DEVICE_BIND};
//!
//! let error = CaptureError::device_bind("usb:046d:0825", "permission denied")
//!     .with_context("binding external camera")
//!     .with_recovery_suggestion("Grant camera access and re-plug the device");
//!
//! assert_eq!(error.status_code(), STATUS_DEVICE_BIND);
//! assert!(!error.is_recoverable());
//! ```

use std::{error::Error as StdError, fmt};

use tracing::{error, warn};

/// Status returned by control operations on success.
pub const STATUS_OK: i32 = 0;
pub const STATUS_CONFIG: i32 = -1;
pub const STATUS_DEVICE_BIND: i32 = -2;
pub const STATUS_PRODUCER_START: i32 = -3;
pub const STATUS_SOURCE: i32 = -4;
pub const STATUS_STATE: i32 = -5;
pub const STATUS_TIMEOUT: i32 = -6;
/// Catch-all for families that never cross the bridge on their own.
pub const STATUS_INTERNAL: i32 = -99;

/// Level an error is logged at by [`CaptureError::log`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Degraded but carrying on: fewer or unfiltered frames
    Warning,
    Error,
}

/// Metadata about where an error occurred
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// The operation being performed when the error occurred
    pub operation: Option<String>,
    /// Additional context about the error
    pub context: Option<String>,
    /// Suggested recovery action
    pub recovery_suggestion: Option<String>,
    pub severity: ErrorSeverity,
    /// Whether the pipeline can carry on past this error
    pub recoverable: bool,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            operation: None,
            context: None,
            recovery_suggestion: None,
            severity: ErrorSeverity::Error,
            recoverable: false,
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Base error type for the capture pipeline
#[derive(Debug)]
pub enum CaptureError {
    /// Configuration validation errors
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// Camera unavailable or access denied
    DeviceBind {
        device: String,
        reason: String,
        context: ErrorContext,
    },
    /// The producer thread could not be spawned or never confirmed its start
    ProducerStart {
        reason: String,
        context: ErrorContext,
    },
    /// Frame source failed to open or deliver
    Source {
        reason: String,
        context: ErrorContext,
    },
    /// External face detector or segmenter failed
    Detector {
        model: String,
        reason: String,
        context: ErrorContext,
    },
    /// Filter pipeline errors
    Processing {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Frame sink rejected a frame
    Sink {
        reason: String,
        context: ErrorContext,
    },
    /// Invalid state transitions
    State {
        current_state: String,
        attempted_operation: String,
        reason: String,
        context: ErrorContext,
    },
    Timeout {
        operation: String,
        duration_ms: u64,
        context: ErrorContext,
    },
    Io {
        operation: String,
        path: Option<String>,
        source: std::io::Error,
        context: ErrorContext,
    },
    /// External library errors
    External {
        library: String,
        source: Box<dyn StdError + Send + Sync>,
        context: ErrorContext,
    },
}

impl CaptureError {
    /// Create a configuration error
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a device bind error
    pub fn device_bind(device: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DeviceBind {
            device: device.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a producer start error
    pub fn producer_start(reason: impl Into<String>) -> Self {
        Self::ProducerStart {
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a frame source error
    pub fn source(reason: impl Into<String>) -> Self {
        Self::Source {
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a detector error. Always recoverable: the frame is treated as a miss.
    pub fn detector(model: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Detector {
            model: model.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
        .recoverable()
        .with_severity(ErrorSeverity::Warning)
    }

    /// Create a processing error
    pub fn processing(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Processing {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a sink error, for sinks rejecting a frame. The pipeline counts
    /// it and moves on to the next frame.
    pub fn sink(reason: impl Into<String>) -> Self {
        Self::Sink {
            reason: reason.into(),
            context: ErrorContext::new(),
        }
        .with_severity(ErrorSeverity::Warning)
    }

    /// Create a state error
    pub fn state(
        current_state: impl Into<String>,
        attempted_operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::State {
            current_state: current_state.into(),
            attempted_operation: attempted_operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Create a timeout error. A timed-out stop still counts as a stop, so
    /// these are logged as warnings.
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration_ms,
            context: ErrorContext::new(),
        }
        .with_severity(ErrorSeverity::Warning)
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: None,
            source,
            context: ErrorContext::new(),
        }
    }

    /// Create an I/O error tied to a file path
    pub fn io_at(
        operation: impl Into<String>,
        path: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: Some(path.into()),
            source,
            context: ErrorContext::new(),
        }
    }

    /// Create an external library error
    pub fn external(
        library: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            library: library.into(),
            source: Box::new(source),
            context: ErrorContext::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    /// Add operation context
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    /// Add recovery suggestion
    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.context_mut().severity = severity;
        self
    }

    /// Mark as recoverable
    pub fn recoverable(mut self) -> Self {
        self.context_mut().recoverable = true;
        self
    }

    /// Get the error context
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::DeviceBind { context, .. } => context,
            Self::ProducerStart { context, .. } => context,
            Self::Source { context, .. } => context,
            Self::Detector { context, .. } => context,
            Self::Processing { context, .. } => context,
            Self::Sink { context, .. } => context,
            Self::State { context, .. } => context,
            Self::Timeout { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Config { context, .. } => context,
            Self::DeviceBind { context, .. } => context,
            Self::ProducerStart { context, .. } => context,
            Self::Source { context, .. } => context,
            Self::Detector { context, .. } => context,
            Self::Processing { context, .. } => context,
            Self::Sink { context, .. } => context,
            Self::State { context, .. } => context,
            Self::Timeout { context, .. } => context,
            Self::Io { context, .. } => context,
            Self::External { context, .. } => context,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::DeviceBind { .. } => "device_bind",
            Self::ProducerStart { .. } => "producer_start",
            Self::Source { .. } => "source",
            Self::Detector { .. } => "detector",
            Self::Processing { .. } => "processing",
            Self::Sink { .. } => "sink",
            Self::State { .. } => "state",
            Self::Timeout { .. } => "timeout",
            Self::Io { .. } => "io",
            Self::External { .. } => "external",
        }
    }

    /// Emit the error through `tracing` at the level its severity calls for.
    pub fn log(&self, operation: &str) {
        let category = self.category();
        match self.context().severity {
            ErrorSeverity::Warning => {
                warn!(operation, category, error = %self, "Operation degraded")
            }
            ErrorSeverity::Error => error!(operation, category, error = %self, "Operation failed"),
        }
    }

    /// Integer status for the bridge boundary. Never returns [`STATUS_OK`].
    pub fn status_code(&self) -> i32 {
        match self {
            Self::Config { .. } => STATUS_CONFIG,
            Self::DeviceBind { .. } => STATUS_DEVICE_BIND,
            Self::ProducerStart { .. } => STATUS_PRODUCER_START,
            Self::Source { .. } => STATUS_SOURCE,
            Self::State { .. } => STATUS_STATE,
            Self::Timeout { .. } => STATUS_TIMEOUT,
            Self::Detector { .. }
            | Self::Processing { .. }
            | Self::Sink { .. }
            | Self::Io { .. }
            | Self::External { .. } => STATUS_INTERNAL,
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Config {
                field,
                value,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Configuration error in '{}': {} (value: {})",
                    field, reason, value
                )
            }
            CaptureError::DeviceBind { device, reason, .. } => {
                write!(f, "Failed to bind device {}: {}", device, reason)
            }
            CaptureError::ProducerStart { reason, .. } => {
                write!(f, "Producer thread failed to start: {}", reason)
            }
            CaptureError::Source { reason, .. } => {
                write!(f, "Frame source failed: {}", reason)
            }
            CaptureError::Detector { model, reason, .. } => {
                write!(f, "Detector '{}' failed: {}", model, reason)
            }
            CaptureError::Processing {
                operation, reason, ..
            } => {
                write!(f, "Processing failed during {}: {}", operation, reason)
            }
            CaptureError::Sink { reason, .. } => {
                write!(f, "Frame sink rejected frame: {}", reason)
            }
            CaptureError::State {
                current_state,
                attempted_operation,
                reason,
                ..
            } => {
                write!(
                    f,
                    "Invalid state transition from '{}' when attempting '{}': {}",
                    current_state, attempted_operation, reason
                )
            }
            CaptureError::Timeout {
                operation,
                duration_ms,
                ..
            } => {
                write!(f, "Timeout during {} after {}ms", operation, duration_ms)
            }
            CaptureError::Io {
                operation,
                path,
                source,
                ..
            } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "I/O error during {} on '{}': {}",
                        operation, path, source
                    )
                } else {
                    write!(f, "I/O error during {}: {}", operation, source)
                }
            }
            CaptureError::External {
                library, source, ..
            } => {
                write!(f, "External library error in {}: {}", library, source)
            }
        }
    }
}

impl StdError for CaptureError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::External { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Result type alias using our custom error type
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Trait for errors the pipeline can absorb without surfacing them
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;
}

impl Recoverable for CaptureError {
    fn is_recoverable(&self) -> bool {
        self.context().recoverable
            || matches!(
                self,
                Self::Detector { .. } | Self::Processing { .. } | Self::Sink { .. }
            )
    }
}

/// Collapse a fallible control operation into the bridge status contract.
pub fn to_status(result: CaptureResult<()>) -> i32 {
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => e.status_code(),
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(error: std::io::Error) -> Self {
        Self::io("unknown", error)
    }
}

impl From<serde_json::Error> for CaptureError {
    fn from(error: serde_json::Error) -> Self {
        Self::external("serde_json", error)
    }
}

impl From<frame_scale::cpu::ScaleError> for CaptureError {
    fn from(error: frame_scale::cpu::ScaleError) -> Self {
        Self::external("frame_scale", error)
    }
}

impl From<image::ImageError> for CaptureError {
    fn from(error: image::ImageError) -> Self {
        Self::external("image", error)
    }
}
