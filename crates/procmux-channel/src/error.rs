use std::time::Duration;

use crate::handler::HandlerError;

/// Errors that can occur in channel operations.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] procmux_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] procmux_frame::FrameError),

    /// OS-level error outside the stream itself (e.g. spawning the receive thread).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer broke the connection protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The application handler rejected or failed on a frame.
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),

    /// Another live channel is already registered under this id.
    #[error("channel {0} is already registered")]
    DuplicateChannel(i64),

    /// The channel has been closed.
    #[error("channel closed")]
    Closed,

    /// The handshake did not complete in time.
    #[error("timed out after {0:?} waiting for the handshake")]
    Timeout(Duration),
}

impl ChannelError {
    /// Whether the receive loop must stop after this error.
    ///
    /// Handler failures only affect the frame being dispatched; everything
    /// else leaves the connection in an unknown state.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ChannelError::Handler(_))
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
