use crate::role::ProcessRole;

/// Errors that can occur while building, sending or decoding process messages.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Argument encoding or decoding failed.
    #[error("value error: {0}")]
    Value(#[from] procmux_value::ValueError),

    /// The underlying channel failed.
    #[error("channel error: {0}")]
    Channel(#[from] procmux_channel::ChannelError),

    /// The envelope was written by an incompatible version.
    #[error("unsupported envelope version {0}")]
    UnsupportedVersion(u8),

    /// A role byte that names no process role.
    #[error("unknown process role {0}")]
    UnknownRole(u8),

    /// The envelope ended before its header was complete.
    #[error("truncated envelope: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// The message name is not valid UTF-8 or does not fit the envelope.
    #[error("invalid message name: {0}")]
    InvalidName(String),

    /// The arguments were not encoded as an array.
    #[error("message arguments must be an array, found {0}")]
    ArgumentsNotArray(procmux_value::ValueType),

    /// A message was addressed to the role of the process sending it.
    #[error("cannot send a process message to the local role ({0})")]
    SameRole(ProcessRole),
}

pub type Result<T> = std::result::Result<T, MessageError>;
