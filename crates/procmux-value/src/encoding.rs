//! Binary form of a value tree.
//!
//! Each node starts with a one-byte tag:
//!
//! | tag | type   | body                                   |
//! |-----|--------|----------------------------------------|
//! | 0   | Null   | -                                      |
//! | 1   | Bool   | u8 (0 or 1)                            |
//! | 2   | Int32  | i32 LE                                 |
//! | 3   | Double | f64 LE (IEEE 754 bits)                 |
//! | 4   | String | u32 LE length + UTF-8 bytes            |
//! | 5   | Binary | u32 LE length + bytes                  |
//! | 6   | Array  | u32 LE count + nodes                   |
//! | 7   | Object | u32 LE count + (u32 key length, key, node)* |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::array::ArrayValue;
use crate::binary::BinaryValue;
use crate::error::{Result, ValueError};
use crate::object::ObjectValue;
use crate::value::Value;

/// Deepest container nesting accepted by [`encode`] and [`decode`].
pub const MAX_DEPTH: usize = 64;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT32: u8 = 2;
const TAG_DOUBLE: u8 = 3;
const TAG_STRING: u8 = 4;
const TAG_BINARY: u8 = 5;
const TAG_ARRAY: u8 = 6;
const TAG_OBJECT: u8 = 7;

/// Smallest possible encoded object entry: empty key length + a Null node.
const MIN_ENTRY_SIZE: usize = 4 + 1;

/// Append the encoding of `value` to `dst`.
pub fn encode(value: &Value, dst: &mut BytesMut) -> Result<()> {
    encode_node(value, dst, 0)
}

/// Encode `value` into a fresh buffer.
pub fn to_bytes(value: &Value) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    encode(value, &mut buf)?;
    Ok(buf.freeze())
}

/// Decode one value from the front of `src`, advancing it past the value.
pub fn decode(src: &mut &[u8]) -> Result<Value> {
    decode_node(src, 0)
}

/// Decode a buffer that must contain exactly one value.
pub fn from_bytes(bytes: &[u8]) -> Result<Value> {
    let mut src = bytes;
    let value = decode(&mut src)?;
    if !src.is_empty() {
        return Err(ValueError::TrailingBytes(src.len()));
    }
    Ok(value)
}

fn encode_node(value: &Value, dst: &mut BytesMut, depth: usize) -> Result<()> {
    match value {
        Value::Null => dst.put_u8(TAG_NULL),
        Value::Bool(v) => {
            dst.put_u8(TAG_BOOL);
            dst.put_u8(u8::from(*v));
        }
        Value::Int32(v) => {
            dst.put_u8(TAG_INT32);
            dst.put_i32_le(*v);
        }
        Value::Double(v) => {
            dst.put_u8(TAG_DOUBLE);
            dst.put_f64_le(*v);
        }
        Value::String(v) => {
            dst.put_u8(TAG_STRING);
            put_bytes(dst, v.as_bytes(), "string")?;
        }
        Value::Binary(v) => {
            dst.put_u8(TAG_BINARY);
            put_bytes(dst, v.as_bytes(), "binary")?;
        }
        Value::Array(array) => {
            check_depth(depth)?;
            dst.put_u8(TAG_ARRAY);
            put_len(dst, array.size(), "array")?;
            for item in array {
                encode_node(item, dst, depth + 1)?;
            }
        }
        Value::Object(object) => {
            check_depth(depth)?;
            dst.put_u8(TAG_OBJECT);
            put_len(dst, object.size(), "object")?;
            for (key, item) in object.iter() {
                put_bytes(dst, key.as_bytes(), "key")?;
                encode_node(item, dst, depth + 1)?;
            }
        }
    }
    Ok(())
}

fn decode_node(src: &mut &[u8], depth: usize) -> Result<Value> {
    need(src, 1)?;
    let value = match src.get_u8() {
        TAG_NULL => Value::Null,
        TAG_BOOL => {
            need(src, 1)?;
            Value::Bool(src.get_u8() != 0)
        }
        TAG_INT32 => {
            need(src, 4)?;
            Value::Int32(src.get_i32_le())
        }
        TAG_DOUBLE => {
            need(src, 8)?;
            Value::Double(src.get_f64_le())
        }
        TAG_STRING => Value::String(take_string(src)?),
        TAG_BINARY => Value::Binary(BinaryValue::new(take_bytes(src)?)),
        TAG_ARRAY => {
            check_depth(depth)?;
            let count = take_len(src)?;
            // Every node is at least one byte; refuse counts the input cannot hold.
            need(src, count)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_node(src, depth + 1)?);
            }
            Value::Array(ArrayValue::from(items))
        }
        TAG_OBJECT => {
            check_depth(depth)?;
            let count = take_len(src)?;
            need(src, count.saturating_mul(MIN_ENTRY_SIZE))?;
            let mut object = ObjectValue::new();
            for _ in 0..count {
                let key = take_string(src)?;
                let item = decode_node(src, depth + 1)?;
                object.set_value(key, item);
            }
            Value::Object(object)
        }
        other => return Err(ValueError::UnknownTag(other)),
    };
    Ok(value)
}

fn check_depth(depth: usize) -> Result<()> {
    if depth >= MAX_DEPTH {
        return Err(ValueError::TooDeep(MAX_DEPTH));
    }
    Ok(())
}

fn put_len(dst: &mut BytesMut, len: usize, what: &'static str) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| ValueError::TooLarge {
        what,
        len,
        max: u32::MAX as usize,
    })?;
    dst.put_u32_le(len);
    Ok(())
}

fn put_bytes(dst: &mut BytesMut, bytes: &[u8], what: &'static str) -> Result<()> {
    put_len(dst, bytes.len(), what)?;
    dst.put_slice(bytes);
    Ok(())
}

fn need(src: &[u8], needed: usize) -> Result<()> {
    if src.len() < needed {
        return Err(ValueError::Truncated {
            needed,
            remaining: src.len(),
        });
    }
    Ok(())
}

fn take_len(src: &mut &[u8]) -> Result<usize> {
    need(src, 4)?;
    Ok(src.get_u32_le() as usize)
}

fn take_bytes(src: &mut &[u8]) -> Result<Vec<u8>> {
    let len = take_len(src)?;
    need(src, len)?;
    let (head, tail) = src.split_at(len);
    let bytes = head.to_vec();
    *src = tail;
    Ok(bytes)
}

fn take_string(src: &mut &[u8]) -> Result<String> {
    String::from_utf8(take_bytes(src)?).map_err(|_| ValueError::InvalidUtf8)
}
