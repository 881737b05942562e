//! Protocol error types
//!
//! Errors raised while decoding row blocks, encoding rows, or handling
//! protocol messages.

use thiserror::Error;

use crate::message::MessageKind;
use crate::types::ColumnType;

/// Errors raised while decoding a schema block or a row
///
/// A decode error is fatal for the block that produced it. It is never
/// retried: replaying the same bytes would fail the same way.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Buffer ended before a field could be read
    #[error("truncated {what}: expected {expected} bytes, got {actual}")]
    Truncated {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Length prefix is negative or exceeds the enclosing buffer
    #[error("invalid {what} length: {length}")]
    InvalidLength { what: &'static str, length: i64 },

    /// Column type code not known to this codec
    #[error("unknown column type: {0}")]
    UnknownColumnType(u8),

    /// Text field is not valid UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// Export format version not supported by this codec
    #[error("unsupported export format version: {0}")]
    UnsupportedFormatVersion(u8),

    /// Decode flags contain unknown bits
    #[error("unsupported decode flags: {0:#x}")]
    UnsupportedFlags(u32),

    /// Block references a previous schema but none has been seen
    #[error("row block references a schema but no schema has been received")]
    MissingSchema,

    /// Bytes left over after a fully decoded structure
    #[error("{remaining} trailing bytes after {what}")]
    TrailingBytes { what: &'static str, remaining: usize },
}

impl DecodeError {
    /// Create a truncation error
    #[inline]
    pub fn truncated(what: &'static str, expected: usize, actual: usize) -> Self {
        Self::Truncated {
            what,
            expected,
            actual,
        }
    }

    /// Create an invalid length error
    #[inline]
    pub fn invalid_length(what: &'static str, length: impl Into<i64>) -> Self {
        Self::InvalidLength {
            what,
            length: length.into(),
        }
    }

    /// Create a trailing bytes error
    #[inline]
    pub fn trailing(what: &'static str, remaining: usize) -> Self {
        Self::TrailingBytes { what, remaining }
    }
}

/// Errors raised while encoding rows into a block
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Row has a different number of values than the schema has columns
    #[error("row has {actual} values but schema has {expected} columns")]
    ColumnCount { expected: usize, actual: usize },

    /// Value does not match the declared column type
    #[error("value for column '{column}' does not match type {expected}")]
    TypeMismatch {
        column: String,
        expected: ColumnType,
    },

    /// Decimal cannot be represented at the configured scale
    #[error("decimal for column '{column}' overflows at scale {scale}")]
    DecimalOverflow { column: String, scale: u32 },

    /// Variable-length value is longer than a 32-bit length prefix allows
    #[error("value for column '{column}' is too large: {size} bytes")]
    ValueTooLarge { column: String, size: usize },
}

/// Errors raised while building, encoding, or decoding protocol messages
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Embedded row or schema data failed to decode
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Message ended before a field could be read
    #[error("truncated message: {0}")]
    Truncated(&'static str),

    /// Unknown message kind tag
    #[error("unknown message kind: {0}")]
    UnknownMessageKind(u8),

    /// A second variant builder was called on a message
    #[error("message payload already set to {existing}, cannot set {attempted}")]
    PayloadAlreadySet {
        existing: MessageKind,
        attempted: MessageKind,
    },

    /// Message was encoded before any variant builder was called
    #[error("message has no payload")]
    MissingPayload,

    /// Frame exceeds the maximum accepted size
    #[error("frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Text field is not valid UTF-8
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}

impl ProtocolError {
    /// Check if this error is a protocol violation (broken invariant upstream)
    ///
    /// Violations indicate a programming error on one side of the
    /// connection and must terminate it rather than be tolerated.
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::PayloadAlreadySet { .. } | Self::MissingPayload)
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;
