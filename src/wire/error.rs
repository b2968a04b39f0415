// ABOUTME: Decode errors for the keysign wire format.
// ABOUTME: Raised on truncated input, oversized length prefixes, and leftover bytes.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("truncated input: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("length prefix {length} at offset {offset} exceeds {available} remaining bytes")]
    LengthOverflow {
        offset: usize,
        length: usize,
        available: usize,
    },

    #[error("{count} trailing bytes after record")]
    TrailingBytes { count: usize },

    #[error("string field at offset {offset} is not valid UTF-8")]
    InvalidUtf8 { offset: usize },
}
