//! Export protocol messages
//!
//! Messages exchanged between the engine and the export client. Every
//! message names the stream it belongs to (generation, partition, table
//! signature) and carries exactly one variant payload.
//!
//! # Wire Format (big-endian)
//!
//! ```text
//! [u32 frame_len][u8 kind][i64 generation][i32 partition][u32 sig_len][signature]
//!   POLL / ACK:       [i64 ack_offset]
//!   POLL_RESPONSE:    [i64 ack_offset][u32 data_len][data]
//!   OPEN_RESPONSE:    [u32 len][payload]
//!   ERROR:            [u32 len][utf8 message]
//!   OPEN / CLOSE:     (nothing)
//! ```
//!
//! `frame_len` excludes the 4-byte length field itself.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, ProtocolError};
use crate::wire::{
    check_frame_size, decode_bytes, decode_i32, decode_i64, decode_string, decode_u8,
    encode_bytes, encode_string,
};

/// Ack offset sentinel meaning nothing has been acknowledged yet
pub const NO_ACK: i64 = i64::MIN;

/// Message kind tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Open = 1,
    OpenResponse = 2,
    Poll = 3,
    PollResponse = 4,
    Ack = 5,
    Close = 6,
    Error = 7,
}

impl MessageKind {
    pub const fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Open),
            2 => Some(Self::OpenResponse),
            3 => Some(Self::Poll),
            4 => Some(Self::PollResponse),
            5 => Some(Self::Ack),
            6 => Some(Self::Close),
            7 => Some(Self::Error),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::OpenResponse => "OPEN_RESPONSE",
            Self::Poll => "POLL",
            Self::PollResponse => "POLL_RESPONSE",
            Self::Ack => "ACK",
            Self::Close => "CLOSE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant payload of a message
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Open,
    OpenResponse(Bytes),
    Poll { ack_offset: i64 },
    PollResponse { ack_offset: i64, data: Bytes },
    Ack { ack_offset: i64 },
    Close,
    Error(String),
}

impl Payload {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Open => MessageKind::Open,
            Self::OpenResponse(_) => MessageKind::OpenResponse,
            Self::Poll { .. } => MessageKind::Poll,
            Self::PollResponse { .. } => MessageKind::PollResponse,
            Self::Ack { .. } => MessageKind::Ack,
            Self::Close => MessageKind::Close,
            Self::Error(_) => MessageKind::Error,
        }
    }
}

/// One protocol message
///
/// Created with [`ExportProtoMessage::new`], then given its variant by
/// exactly one builder call:
///
/// ```
/// use export_protocol::ExportProtoMessage;
///
/// let msg = ExportProtoMessage::new(1, 0, "orders").poll(42).unwrap();
/// assert!(msg.is_poll());
/// assert!(msg.ack(43).is_err());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ExportProtoMessage {
    generation: i64,
    partition_id: i32,
    signature: String,
    payload: Option<Payload>,
}

impl ExportProtoMessage {
    /// Create a message for one stream, without a payload yet
    pub fn new(generation: i64, partition_id: i32, signature: impl Into<String>) -> Self {
        Self {
            generation,
            partition_id,
            signature: signature.into(),
            payload: None,
        }
    }

    fn with_payload(mut self, payload: Payload) -> Result<Self, ProtocolError> {
        if let Some(existing) = &self.payload {
            return Err(ProtocolError::PayloadAlreadySet {
                existing: existing.kind(),
                attempted: payload.kind(),
            });
        }
        self.payload = Some(payload);
        Ok(self)
    }

    pub fn open(self) -> Result<Self, ProtocolError> {
        self.with_payload(Payload::Open)
    }

    pub fn open_response(self, payload: Bytes) -> Result<Self, ProtocolError> {
        self.with_payload(Payload::OpenResponse(payload))
    }

    pub fn poll(self, ack_offset: i64) -> Result<Self, ProtocolError> {
        self.with_payload(Payload::Poll { ack_offset })
    }

    pub fn poll_response(self, ack_offset: i64, data: Bytes) -> Result<Self, ProtocolError> {
        self.with_payload(Payload::PollResponse { ack_offset, data })
    }

    pub fn ack(self, ack_offset: i64) -> Result<Self, ProtocolError> {
        self.with_payload(Payload::Ack { ack_offset })
    }

    pub fn close(self) -> Result<Self, ProtocolError> {
        self.with_payload(Payload::Close)
    }

    pub fn error(self, message: impl Into<String>) -> Result<Self, ProtocolError> {
        self.with_payload(Payload::Error(message.into()))
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    #[inline]
    pub fn generation(&self) -> i64 {
        self.generation
    }

    #[inline]
    pub fn partition_id(&self) -> i32 {
        self.partition_id
    }

    #[inline]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    #[inline]
    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    /// Take the payload, consuming the message
    #[inline]
    pub fn into_payload(self) -> Option<Payload> {
        self.payload
    }

    #[inline]
    pub fn kind(&self) -> Option<MessageKind> {
        self.payload.as_ref().map(Payload::kind)
    }

    pub fn is_open(&self) -> bool {
        self.kind() == Some(MessageKind::Open)
    }

    pub fn is_open_response(&self) -> bool {
        self.kind() == Some(MessageKind::OpenResponse)
    }

    pub fn is_poll(&self) -> bool {
        self.kind() == Some(MessageKind::Poll)
    }

    pub fn is_poll_response(&self) -> bool {
        self.kind() == Some(MessageKind::PollResponse)
    }

    pub fn is_ack(&self) -> bool {
        self.kind() == Some(MessageKind::Ack)
    }

    pub fn is_close(&self) -> bool {
        self.kind() == Some(MessageKind::Close)
    }

    pub fn is_error(&self) -> bool {
        self.kind() == Some(MessageKind::Error)
    }

    /// Ack offset of a POLL, POLL_RESPONSE or ACK
    pub fn ack_offset(&self) -> Option<i64> {
        match self.payload.as_ref()? {
            Payload::Poll { ack_offset }
            | Payload::PollResponse { ack_offset, .. }
            | Payload::Ack { ack_offset } => Some(*ack_offset),
            _ => None,
        }
    }

    /// Data block of a POLL_RESPONSE
    pub fn data(&self) -> Option<&Bytes> {
        match self.payload.as_ref()? {
            Payload::PollResponse { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Payload of an OPEN_RESPONSE
    pub fn open_response_payload(&self) -> Option<&Bytes> {
        match self.payload.as_ref()? {
            Payload::OpenResponse(payload) => Some(payload),
            _ => None,
        }
    }

    /// Text of an ERROR
    pub fn error_message(&self) -> Option<&str> {
        match self.payload.as_ref()? {
            Payload::Error(message) => Some(message),
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    /// Encode to a frame including its length prefix
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let payload = self.payload.as_ref().ok_or(ProtocolError::MissingPayload)?;

        let mut buf = BytesMut::with_capacity(64 + self.signature.len());
        // Reserve space for length prefix (filled in at end)
        buf.put_u32(0);
        buf.put_u8(payload.kind() as u8);
        buf.put_i64(self.generation);
        buf.put_i32(self.partition_id);
        encode_string(&self.signature, &mut buf);

        match payload {
            Payload::Open | Payload::Close => {}
            Payload::Poll { ack_offset } | Payload::Ack { ack_offset } => {
                buf.put_i64(*ack_offset);
            }
            Payload::PollResponse { ack_offset, data } => {
                buf.put_i64(*ack_offset);
                encode_bytes(data, &mut buf);
            }
            Payload::OpenResponse(bytes) => encode_bytes(bytes, &mut buf),
            Payload::Error(message) => encode_string(message, &mut buf),
        }

        let len = check_frame_size(buf.len() - 4)? as u32;
        buf[0..4].copy_from_slice(&len.to_be_bytes());
        Ok(buf.freeze())
    }

    /// Decode a frame body (after the length prefix has been read)
    pub fn decode(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let tag = decode_u8(&mut buf, "message kind")?;
        let kind = MessageKind::from_u8(tag).ok_or(ProtocolError::UnknownMessageKind(tag))?;
        let generation = decode_i64(&mut buf, "generation")?;
        let partition_id = decode_i32(&mut buf, "partition id")?;
        let signature = decode_string(&mut buf, "signature")?;

        let payload = match kind {
            MessageKind::Open => Payload::Open,
            MessageKind::Close => Payload::Close,
            MessageKind::Poll => Payload::Poll {
                ack_offset: decode_i64(&mut buf, "ack offset")?,
            },
            MessageKind::Ack => Payload::Ack {
                ack_offset: decode_i64(&mut buf, "ack offset")?,
            },
            MessageKind::PollResponse => {
                let ack_offset = decode_i64(&mut buf, "ack offset")?;
                let data = decode_bytes(&mut buf, "data block")?;
                Payload::PollResponse { ack_offset, data }
            }
            MessageKind::OpenResponse => {
                Payload::OpenResponse(decode_bytes(&mut buf, "open response")?)
            }
            MessageKind::Error => Payload::Error(decode_string(&mut buf, "error message")?),
        };

        if buf.has_remaining() {
            return Err(DecodeError::trailing("message", buf.remaining()).into());
        }

        Ok(Self {
            generation,
            partition_id,
            signature,
            payload: Some(payload),
        })
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod message_test;
