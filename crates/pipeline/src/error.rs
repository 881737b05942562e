//! Pipeline error types
//!
//! Errors raised while driving export streams and engine connections.

use std::io;

use thiserror::Error;

use export_protocol::{DecodeError, MessageKind, ProtocolError, StreamKey};

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Transport to the engine is gone; recovered by reconnecting
    #[error("connection '{connection}' lost: {reason}")]
    ConnectionLost { connection: String, reason: String },

    /// Connect or handshake did not finish in time
    #[error("connection to '{server}' timed out")]
    ConnectTimeout { server: String },

    /// Engine rejected the handshake; not retried
    #[error("authentication to '{server}' failed with status {status}: {message}")]
    AuthenticationFailed {
        server: String,
        status: u8,
        message: String,
    },

    /// Socket error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or invalid protocol message
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Data block could not be decoded; the block is not retried
    #[error("decode error on {stream}: {source}")]
    Decode {
        stream: StreamKey,
        #[source]
        source: DecodeError,
    },

    /// Engine answered with an ack offset lower than the one last polled
    #[error("ack offset regressed on {stream} via '{connection}': {received} < {previous}")]
    AckRegression {
        stream: StreamKey,
        connection: String,
        previous: i64,
        received: i64,
    },

    /// Message kind not valid in the current state
    #[error("unexpected {kind} on {stream} via '{connection}'")]
    UnexpectedMessage {
        stream: StreamKey,
        connection: String,
        kind: MessageKind,
    },

    /// Client is shutting down
    #[error("export client is shutting down")]
    ShuttingDown,
}

impl PipelineError {
    /// Create a ConnectionLost error
    #[inline]
    pub fn connection_lost(connection: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConnectionLost {
            connection: connection.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error is a protocol violation (broken invariant upstream)
    pub fn is_violation(&self) -> bool {
        match self {
            Self::AckRegression { .. } | Self::UnexpectedMessage { .. } => true,
            Self::Protocol(e) => e.is_violation(),
            _ => false,
        }
    }

    /// Check if reconnecting may clear this error
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::AuthenticationFailed { .. } | Self::ShuttingDown
        )
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
