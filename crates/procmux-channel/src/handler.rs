use std::fmt;
use std::sync::mpsc;

use bytes::Bytes;
use procmux_frame::FrameType;

use crate::channel::Channel;
use crate::error::Result;

/// Failure reported by a [`Handler`].
///
/// The receive loop logs it and moves on to the next frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// A frame delivered to a [`Handler`], plus the channel it arrived on.
pub struct MessageContext {
    frame_type: FrameType,
    from: i64,
    to: i64,
    payload: Bytes,
    channel: Channel,
}

impl MessageContext {
    pub(crate) fn new(frame_type: FrameType, from: i64, to: i64, payload: Bytes, channel: Channel) -> Self {
        Self {
            frame_type,
            from,
            to,
            payload,
            channel,
        }
    }

    /// `Common` for direct traffic, `Relay` for frames forwarded from another channel.
    pub fn frame_type(&self) -> FrameType {
        self.frame_type
    }

    /// Id of the channel that originated the frame.
    pub fn from(&self) -> i64 {
        self.from
    }

    pub fn to(&self) -> i64 {
        self.to
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// The channel that received the frame.
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    /// Answer the sender: relayed frames are relayed back to their origin,
    /// direct frames go back over the receiving channel.
    pub fn reply(&self, payload: &[u8]) -> Result<bool> {
        match self.frame_type {
            FrameType::Relay => self.channel.send_to_channel(self.from, payload),
            _ => self.channel.send(payload),
        }
    }
}

impl fmt::Debug for MessageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageContext")
            .field("frame_type", &self.frame_type)
            .field("from", &self.from)
            .field("to", &self.to)
            .field("payload_len", &self.payload.len())
            .field("channel", &self.channel.id())
            .finish()
    }
}

/// Consumer of the frames a channel receives.
///
/// Called on the channel's receive thread, one frame at a time, in arrival
/// order. A slow handler stalls that channel only.
pub trait Handler: Send + Sync {
    fn handle(&self, ctx: &MessageContext) -> std::result::Result<(), HandlerError>;

    /// The channel finished its handshake and is registered under `id`.
    fn on_connected(&self, _channel: &Channel, _id: i64) {}
}

impl<F> Handler for F
where
    F: Fn(&MessageContext) -> std::result::Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, ctx: &MessageContext) -> std::result::Result<(), HandlerError> {
        self(ctx)
    }
}

/// Owned copy of a delivered frame, as produced by [`QueueHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub frame_type: FrameType,
    pub from: i64,
    pub to: i64,
    /// Channel that the frame was delivered to.
    pub channel_id: Option<i64>,
    pub payload: Bytes,
}

/// Handler that pushes every delivered frame onto a queue.
///
/// Lets a caller consume frames with plain blocking `recv` calls instead of
/// running logic on the receive thread.
pub struct QueueHandler {
    tx: mpsc::Sender<ReceivedFrame>,
}

impl QueueHandler {
    pub fn new() -> (Self, mpsc::Receiver<ReceivedFrame>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl Handler for QueueHandler {
    fn handle(&self, ctx: &MessageContext) -> std::result::Result<(), HandlerError> {
        let frame = ReceivedFrame {
            frame_type: ctx.frame_type(),
            from: ctx.from(),
            to: ctx.to(),
            channel_id: ctx.channel().id(),
            payload: ctx.payload().clone(),
        };
        self.tx
            .send(frame)
            .map_err(|_| HandlerError::new("queue receiver dropped"))
    }
}
