//! BCS return-value decoding
//!
//! Dev-inspect results come back as one opaque byte buffer per return slot.
//! This module turns those buffers into [`Value`]s according to a declared
//! [`Schema`], rejecting anything that does not match exactly.

mod decoder;
pub mod schema;

pub use decoder::{decode, decode_slots};
pub use schema::{Schema, Value};

/// Malformed or mismatched return buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("length prefix {declared} overruns the {remaining} remaining bytes")]
    LengthOverrun { declared: usize, remaining: usize },

    #[error("invalid ULEB128 length prefix")]
    InvalidUleb128,

    #[error("invalid bool byte: {0}")]
    InvalidBool(u8),

    #[error("invalid option length: {0}")]
    InvalidOption(usize),

    #[error("{remaining} trailing bytes after decoded value")]
    TrailingBytes { remaining: usize },

    #[error("duplicate element in set")]
    DuplicateSetElement,

    #[error("expected {expected} return values, found {found}")]
    ReturnCount { expected: usize, found: usize },

    #[error("expected {expected} value, found {found}")]
    UnexpectedValue {
        expected: &'static str,
        found: &'static str,
    },
}
