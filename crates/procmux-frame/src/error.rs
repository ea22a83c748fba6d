/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The header carries a frame type byte this version does not know.
    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream reached EOF (possibly in the middle of a frame).
    #[error("connection closed")]
    ConnectionClosed,
}

impl FrameError {
    /// Whether this error means the peer sent bytes that cannot be a valid
    /// frame, as opposed to the stream going away.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            FrameError::UnknownFrameType(_) | FrameError::PayloadTooLarge { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
