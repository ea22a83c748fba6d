//! Structured message arguments.
//!
//! A [`Value`] is a recursive tagged union of scalars, byte blobs, arrays and
//! insertion-ordered objects. Values own their children outright: `clone()`
//! is a deep copy and dropping a value releases the whole tree.
//!
//! [`encode`]/[`decode`] give values a self-describing binary form so they can
//! travel as frame payloads between processes.

pub mod array;
pub mod binary;
pub mod encoding;
pub mod error;
pub mod json;
pub mod object;
pub mod value;

pub use array::ArrayValue;
pub use binary::BinaryValue;
pub use encoding::{decode, encode, from_bytes, to_bytes, MAX_DEPTH};
pub use error::{Result, ValueError};
pub use object::{Keys, ObjectValue};
pub use value::{Value, ValueType};
