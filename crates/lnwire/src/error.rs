//! TLV error types

use thiserror::Error;

/// Errors raised while encoding or decoding a TLV stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TlvError {
    /// Input ended in the middle of a field
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// BigSize used a longer encoding than necessary
    #[error("non-canonical bigsize encoding for value {value}")]
    NonCanonicalBigSize { value: u64 },

    /// The same type appears twice
    #[error("duplicate tlv type {0}")]
    DuplicateType(u64),

    /// Types in a stream must be strictly increasing
    #[error("tlv types out of order: {next} after {prev}")]
    UnsortedTypes { prev: u64, next: u64 },

    /// Declared length exceeds the remaining input
    #[error("tlv type {record_type} declares {length} bytes, only {remaining} remaining")]
    LengthOverflow {
        record_type: u64,
        length: u64,
        remaining: usize,
    },

    /// A record sink rejected its value
    #[error("invalid value for tlv type {record_type}: {message}")]
    InvalidValue { record_type: u64, message: String },
}

impl TlvError {
    /// Create an invalid value error
    pub fn invalid_value(record_type: u64, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            record_type,
            message: message.into(),
        }
    }
}
