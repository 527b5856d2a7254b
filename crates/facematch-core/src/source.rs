//! Frame acquisition boundary.

use crate::frame::Frame;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The source cannot be used at all (missing device, permission denied).
    /// The message is meant for the user.
    #[error("{0}")]
    Unavailable(String),
    /// The source works but had no frame this time.
    #[error("no frame available: {0}")]
    NoFrame(String),
}

/// Supplies one still per call.
///
/// Failures are reported, never panicked: callers treat an unavailable
/// source as "capture disabled" and a missing frame during a burst as a
/// skipped tick.
pub trait FrameSource: Send {
    fn capture(&mut self) -> Result<Frame, SourceError>;
}
