//! Frame sink: the outgoing video transport, reached through an adapter.

use crate::core::{Frame, Orientation, PixelFormat};
use crate::error::CaptureResult;

/// Consumer of finished frames.
///
/// `consume` borrows the frame, so a sink cannot keep it past the call; a sink
/// that needs the pixels later must copy them. Ownership returns to the
/// pipeline, which recycles the buffer.
pub trait FrameSink: Send + Sync {
    fn consume(&self, frame: &Frame) -> CaptureResult<()>;

    /// Layout the transport expects, if it cares.
    fn expected_format(&self) -> Option<PixelFormat> {
        None
    }

    fn expected_orientation(&self) -> Orientation {
        Orientation::Up
    }
}
