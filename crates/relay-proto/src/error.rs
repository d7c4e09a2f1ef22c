use thiserror::Error;

use crate::frame::HEADER_SIZE;

/// Errors surfaced while framing or parsing a wire [`crate::ICommand`].
///
/// Per the propagation policy, a `FrameError` on a connection's byte stream
/// closes that connection only; it is never escalated to the local node.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame shorter than the {HEADER_SIZE}-byte header ({0} bytes)")]
    Truncated(usize),

    #[error("frame header declares size {declared} but buffer holds {actual} bytes")]
    SizeMismatch { declared: u64, actual: usize },

    #[error("unknown transport scheme {0:?}")]
    UnknownTransport(String),

    #[error("malformed connection description {0:?}")]
    MalformedDescription(String),

    #[error("payload decode failed: {0}")]
    Decode(String),
}
