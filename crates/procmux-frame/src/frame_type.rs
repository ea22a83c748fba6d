use std::fmt;

use crate::error::FrameError;

/// Kind of a frame, the first byte of every header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// A client announces its channel id. Payload: the id, `i64` LE.
    Connect = 0,
    /// The hub accepts an announced id. Payload: the same id.
    ConnectAck = 1,
    /// Direct delivery; `from == to`.
    Common = 2,
    /// Routed delivery to the channel registered under `to`.
    Relay = 3,
}

impl FrameType {
    /// Handshake frames are consumed by the channel itself and never reach
    /// application handlers.
    pub fn is_handshake(self) -> bool {
        matches!(self, FrameType::Connect | FrameType::ConnectAck)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FrameType::Connect => "connect",
            FrameType::ConnectAck => "connect_ack",
            FrameType::Common => "common",
            FrameType::Relay => "relay",
        }
    }
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(FrameType::Connect),
            1 => Ok(FrameType::ConnectAck),
            2 => Ok(FrameType::Common),
            3 => Ok(FrameType::Relay),
            other => Err(FrameError::UnknownFrameType(other)),
        }
    }
}

impl From<FrameType> for u8 {
    fn from(value: FrameType) -> Self {
        value as u8
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
