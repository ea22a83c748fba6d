use crate::value::ValueType;

/// Errors that can occur while decoding or converting values.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValueError {
    /// A node carries a tag byte that does not name a value type.
    #[error("unknown value tag {0}")]
    UnknownTag(u8),

    /// The input ended before the value was complete.
    #[error("truncated value: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A string node is not valid UTF-8.
    #[error("string is not valid utf-8")]
    InvalidUtf8,

    /// Containers are nested deeper than the decoder allows.
    #[error("value nesting exceeds depth {0}")]
    TooDeep(usize),

    /// Bytes were left over after a complete top-level value.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    /// A length or count does not fit the wire format.
    #[error("{what} too large ({len}, max {max})")]
    TooLarge {
        what: &'static str,
        len: usize,
        max: usize,
    },

    /// A decoded value had a different type than the caller required.
    #[error("expected {expected}, found {found}")]
    UnexpectedType {
        expected: ValueType,
        found: ValueType,
    },
}

pub type Result<T> = std::result::Result<T, ValueError>;
