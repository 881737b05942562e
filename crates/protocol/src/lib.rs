//! Export Protocol - row codec and wire messages for the export client
//!
//! This crate provides the types exchanged between the database engine and
//! an export consumer:
//! - `TableSchema` / `ExportRow` - schema descriptors and decoded rows
//! - `BlockDecoder` / `BlockBuilder` - data block decoding and encoding
//! - `ExportProtoMessage` - OPEN, POLL, POLL_RESPONSE, ACK and friends
//! - `AdvertisedDataSource` / `StreamKey` - exportable stream descriptions
//! - `AuthRequest` / `AuthResponse` - connection handshake frames
//!
//! # Design Principles
//!
//! - **Zero-copy**: data blocks are `bytes::Bytes`; varbinary values are
//!   slices of the block they came from
//! - **Strict**: every length prefix is bounds-checked, every structure must
//!   be consumed exactly, nothing is padded or truncated silently

mod auth;
mod block;
mod encode;
mod error;
mod message;
mod row;
mod schema;
mod source;
mod types;
mod wire;

pub use auth::{AUTH_OK, AuthRequest, AuthResponse};
pub use block::BlockDecoder;
pub use encode::{BlockBuilder, encode_null_flags, encode_row, encode_schema};
pub use error::{DecodeError, EncodeError, ProtocolError};
pub use message::{ExportProtoMessage, MessageKind, NO_ACK, Payload};
pub use row::{ExportRow, decode_row, extract_null_flags};
pub use schema::{
    CodecOptions, ColumnInfo, DEFAULT_DECIMAL_SCALE, DecodeFlags, EXPORT_FORMAT_VERSION,
    INTERNAL_COLUMN_COUNT, NO_PARTITION_COLUMN, TableSchema, decode_buffer_schema,
};
pub use source::{AdvertisedDataSource, OpenResponse, StreamKey};
pub use types::{ColumnType, Decimal, MAX_DECIMAL_SCALE, Value};
pub use wire::{MAX_FRAME_SIZE, check_frame_size, read_length_prefix};

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;
