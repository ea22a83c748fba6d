//! Length-prefixed, addressed framing for procmux channels.
//!
//! Every frame on the wire carries:
//! - a 1-byte frame type (`Connect`, `ConnectAck`, `Common`, `Relay`)
//! - the 8-byte id of the sending channel
//! - the 8-byte id of the addressed channel
//! - a 4-byte payload length
//!
//! All integers are little-endian. Readers deal with partial reads so callers
//! only ever see complete frames.

pub mod codec;
pub mod error;
pub mod frame_type;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::ChannelCodec;
pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
pub use error::{FrameError, Result};
pub use frame_type::FrameType;
pub use reader::FrameReader;
pub use writer::FrameWriter;
