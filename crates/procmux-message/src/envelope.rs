//! Payload layout for process messages.
//!
//! ```text
//! ┌─────────┬────────┬────────┬──────────┬──────────┬─────────────────────┐
//! │ Version │ Source │ Target │ Name len │ Name     │ Arguments           │
//! │ (1B)    │ (1B)   │ (1B)   │ (4B LE)  │ (UTF-8)  │ (encoded Array)     │
//! └─────────┴────────┴────────┴──────────┴──────────┴─────────────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use procmux_value::Value;

use crate::error::{MessageError, Result};
use crate::message::ProcessMessage;
use crate::role::ProcessRole;

/// Current envelope layout version.
pub const ENVELOPE_VERSION: u8 = 1;

const FIXED_HEADER_SIZE: usize = 3 + 4;

/// A decoded process message with its addressing.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub source: ProcessRole,
    pub target: ProcessRole,
    pub message: ProcessMessage,
}

/// Encode `message` as sent from `source` to `target`.
pub fn encode_envelope(
    source: ProcessRole,
    target: ProcessRole,
    message: &ProcessMessage,
) -> Result<Bytes> {
    let name = message.name().as_bytes();
    let name_len = u32::try_from(name.len())
        .map_err(|_| MessageError::InvalidName(format!("name is {} bytes long", name.len())))?;

    let mut buf = BytesMut::with_capacity(FIXED_HEADER_SIZE + name.len() + 16);
    buf.put_u8(ENVELOPE_VERSION);
    buf.put_u8(source.into());
    buf.put_u8(target.into());
    buf.put_u32_le(name_len);
    buf.put_slice(name);

    // The argument list goes through the value encoder as an Array node.
    let arguments = Value::Array(message.argument_list().clone());
    procmux_value::encode(&arguments, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode a payload produced by [`encode_envelope`].
pub fn decode_envelope(payload: &[u8]) -> Result<Envelope> {
    let mut src = payload;
    need(src, FIXED_HEADER_SIZE)?;

    let version = src.get_u8();
    if version != ENVELOPE_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }
    let source = ProcessRole::try_from(src.get_u8()).map_err(MessageError::UnknownRole)?;
    let target = ProcessRole::try_from(src.get_u8()).map_err(MessageError::UnknownRole)?;

    let name_len = src.get_u32_le() as usize;
    need(src, name_len)?;
    let name = std::str::from_utf8(&src[..name_len])
        .map_err(|err| MessageError::InvalidName(err.to_string()))?
        .to_string();
    src.advance(name_len);

    let arguments = match procmux_value::from_bytes(src)? {
        Value::Array(arguments) => arguments,
        other => return Err(MessageError::ArgumentsNotArray(other.value_type())),
    };

    Ok(Envelope {
        source,
        target,
        message: ProcessMessage::with_arguments(name, arguments),
    })
}

fn need(src: &[u8], needed: usize) -> Result<()> {
    if src.len() < needed {
        return Err(MessageError::Truncated {
            needed,
            remaining: src.len(),
        });
    }
    Ok(())
}
