use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::frame_type::FrameType;

/// Frame header: type (1) + from (8) + to (8) + length (4) = 21 bytes.
pub const HEADER_SIZE: usize = 21;

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Size of a channel id carried in `Connect`/`ConnectAck` payloads.
const CHANNEL_ID_SIZE: usize = 8;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    /// Channel that produced the frame.
    pub from: i64,
    /// Channel the frame is addressed to.
    pub to: i64,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(frame_type: FrameType, from: i64, to: i64, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            from,
            to,
            payload: payload.into(),
        }
    }

    /// Handshake announcement for channel `id`.
    pub fn connect(id: i64) -> Self {
        Self::new(FrameType::Connect, id, id, id.to_le_bytes().to_vec())
    }

    /// Handshake acknowledgement for channel `id`.
    pub fn connect_ack(id: i64) -> Self {
        Self::new(FrameType::ConnectAck, id, id, id.to_le_bytes().to_vec())
    }

    /// Direct delivery on channel `id`.
    pub fn common(id: i64, payload: impl Into<Bytes>) -> Self {
        Self::new(FrameType::Common, id, id, payload)
    }

    /// Routed delivery from `from` to `to`.
    pub fn relay(from: i64, to: i64, payload: impl Into<Bytes>) -> Self {
        Self::new(FrameType::Relay, from, to, payload)
    }

    /// The channel id carried by a `Connect`/`ConnectAck` payload.
    ///
    /// Returns `None` for other frame types or a payload that is not exactly
    /// one `i64`.
    pub fn announced_id(&self) -> Option<i64> {
        if !self.frame_type.is_handshake() {
            return None;
        }
        let bytes: [u8; CHANNEL_ID_SIZE] = self.payload.as_ref().try_into().ok()?;
        Some(i64::from_le_bytes(bytes))
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Encode a frame into the wire format.
///
/// ```text
/// ┌──────────┬────────────┬────────────┬────────────┬──────────────────┐
/// │ Type     │ From       │ To         │ Length     │ Payload          │
/// │ (1B)     │ (8B LE)    │ (8B LE)    │ (4B LE)    │ (Length bytes)   │
/// └──────────┴────────────┴────────────┴────────────┴──────────────────┘
/// ```
pub fn encode_frame(
    frame_type: FrameType,
    from: i64,
    to: i64,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(frame_type.into());
    dst.put_i64_le(from);
    dst.put_i64_le(to);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// The header is validated as soon as it is complete, so an unknown type or an
/// oversized length fails before the payload is buffered. On success the frame
/// bytes are consumed from `src`.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut header = &src[..HEADER_SIZE];
    let frame_type = FrameType::try_from(header.get_u8())?;
    let from = header.get_i64_le();
    let to = header.get_i64_le();
    let payload_len = header.get_u32_le() as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = HEADER_SIZE + payload_len;
    if src.len() < total {
        src.reserve(total - src.len());
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Frame {
        frame_type,
        from,
        to,
        payload,
    }))
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(frame: &Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(frame.frame_type, frame.from, frame.to, &frame.payload, &mut buf).unwrap();
        buf
    }

    #[test]
    fn header_layout_is_little_endian() {
        let buf = encode(&Frame::relay(1, 0x0102, b"hi".to_vec()));

        assert_eq!(buf.len(), HEADER_SIZE + 2);
        assert_eq!(buf[0], 3);
        assert_eq!(&buf[1..9], &1i64.to_le_bytes());
        assert_eq!(&buf[9..17], &0x0102i64.to_le_bytes());
        assert_eq!(&buf[17..21], &2u32.to_le_bytes());
        assert_eq!(&buf[21..], b"hi");
    }

    #[test]
    fn encode_decode_relay() {
        let mut buf = encode(&Frame::relay(7, -3, b"hello, procmux!".to_vec()));

        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();

        assert_eq!(frame.frame_type, FrameType::Relay);
        assert_eq!(frame.from, 7);
        assert_eq!(frame.to, -3);
        assert_eq!(frame.payload.as_ref(), b"hello, procmux!");
        assert!(buf.is_empty());
    }

    #[test]
    fn incomplete_header_waits() {
        let mut buf = BytesMut::from(&[2u8, 0, 0][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn incomplete_payload_waits() {
        let mut buf = encode(&Frame::common(1, b"hello".to_vec()));
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);
    }

    #[test]
    fn unknown_type_rejected() {
        let mut buf = encode(&Frame::common(1, b"x".to_vec()));
        buf[0] = 9;
        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(FrameError::UnknownFrameType(9))));
    }

    #[test]
    fn oversized_length_rejected_from_header_alone() {
        let mut buf = BytesMut::new();
        buf.put_u8(2);
        buf.put_i64_le(1);
        buf.put_i64_le(1);
        buf.put_u32_le(u32::MAX);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size, .. }) if size == u32::MAX as usize
        ));
    }

    #[test]
    fn back_to_back_frames() {
        let mut buf = encode(&Frame::connect(5));
        buf.extend_from_slice(&encode(&Frame::common(5, b"second".to_vec())));

        let first = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(first.frame_type, FrameType::Connect);
        assert_eq!(first.announced_id(), Some(5));

        let second = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert_eq!(second.frame_type, FrameType::Common);
        assert_eq!(second.payload.as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_payload() {
        let mut buf = encode(&Frame::common(0, Bytes::new()));
        let frame = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD)
            .unwrap()
            .unwrap();
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn announced_id_requires_handshake_frame_and_exact_size() {
        assert_eq!(Frame::connect_ack(-42).announced_id(), Some(-42));
        assert_eq!(Frame::common(1, 1i64.to_le_bytes().to_vec()).announced_id(), None);
        let short = Frame::new(FrameType::Connect, 1, 1, vec![1u8, 2, 3]);
        assert_eq!(short.announced_id(), None);
    }

    #[test]
    fn wire_size_counts_header() {
        let frame = Frame::common(1, Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 4);
    }
}
