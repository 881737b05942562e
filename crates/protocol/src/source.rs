//! Advertised data sources
//!
//! The engine answers OPEN with the list of streams it can export
//! (one per partition and table) plus the hosts of its cluster.
//!
//! # Wire Format (big-endian, OPEN_RESPONSE payload)
//!
//! ```text
//! [u32 source_count] { source } * source_count
//! [u32 host_count]   { [u32 len][host] } * host_count
//!
//! source:
//! [i32 partition][u32 len][signature][u32 len][table name][i64 generation]
//! [i32 partition_column][u8 format_version]
//! [u32 column_count] { [u32 len][name][u8 type][i32 length] } * column_count
//! ```

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, ProtocolError};
use crate::schema::{ColumnInfo, TableSchema};
use crate::types::ColumnType;
use crate::wire::{decode_i32, decode_i64, decode_string, decode_u32, decode_u8, encode_string};

/// Identifies one export stream
///
/// Sinks are registered under this key; inbound messages are routed to
/// their sink by it.
///
/// # Example
///
/// ```
/// use export_protocol::StreamKey;
///
/// let key = StreamKey::new(3, "orders");
/// assert_eq!(key.to_string(), "orders:3");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    pub partition_id: i32,
    pub signature: String,
}

impl StreamKey {
    #[inline]
    pub fn new(partition_id: i32, signature: impl Into<String>) -> Self {
        Self {
            partition_id,
            signature: signature.into(),
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.signature, self.partition_id)
    }
}

/// One exportable stream as described by the engine
///
/// Immutable for the life of its generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedDataSource {
    pub partition_id: i32,
    pub signature: String,
    pub table_name: String,
    pub generation: i64,
    pub partition_column: i32,
    pub format_version: u8,
    pub columns: Vec<ColumnInfo>,
}

impl AdvertisedDataSource {
    /// Describe a stream with the same columns as `schema`
    pub fn from_schema(
        partition_id: i32,
        signature: impl Into<String>,
        format_version: u8,
        schema: &TableSchema,
    ) -> Self {
        Self {
            partition_id,
            signature: signature.into(),
            table_name: schema.table_name.clone(),
            generation: schema.generation,
            partition_column: schema.partition_column,
            format_version,
            columns: schema.columns.clone(),
        }
    }

    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(self.partition_id, self.signature.clone())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column_types(&self) -> impl Iterator<Item = ColumnType> + '_ {
        self.columns.iter().map(|c| c.column_type)
    }

    pub fn column_lengths(&self) -> impl Iterator<Item = i32> + '_ {
        self.columns.iter().map(|c| c.length)
    }

    /// Schema descriptor matching this advertisement
    pub fn schema(&self) -> TableSchema {
        TableSchema::new(
            self.table_name.clone(),
            self.generation,
            self.partition_column,
            self.columns.clone(),
        )
    }

    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.partition_id);
        encode_string(&self.signature, buf);
        encode_string(&self.table_name, buf);
        buf.put_i64(self.generation);
        buf.put_i32(self.partition_column);
        buf.put_u8(self.format_version);
        buf.put_u32(self.columns.len() as u32);
        for column in &self.columns {
            encode_string(&column.name, buf);
            buf.put_u8(column.column_type.as_u8());
            buf.put_i32(column.length);
        }
    }

    fn decode(buf: &mut Bytes) -> Result<Self, ProtocolError> {
        let partition_id = decode_i32(buf, "source partition")?;
        let signature = decode_string(buf, "source signature")?;
        let table_name = decode_string(buf, "source table name")?;
        let generation = decode_i64(buf, "source generation")?;
        let partition_column = decode_i32(buf, "source partition column")?;
        let format_version = decode_u8(buf, "source format version")?;

        let count = decode_u32(buf, "source column count")? as usize;
        // Each column needs at least 9 bytes
        if count > buf.remaining() / 9 {
            return Err(ProtocolError::Truncated("source columns"));
        }
        let mut columns = Vec::with_capacity(count);
        for _ in 0..count {
            let name = decode_string(buf, "source column name")?;
            let code = decode_u8(buf, "source column type")?;
            let column_type =
                ColumnType::from_u8(code).ok_or(DecodeError::UnknownColumnType(code))?;
            let length = decode_i32(buf, "source column length")?;
            columns.push(ColumnInfo {
                name,
                column_type,
                length,
            });
        }

        Ok(Self {
            partition_id,
            signature,
            table_name,
            generation,
            partition_column,
            format_version,
            columns,
        })
    }
}

/// Payload of an OPEN_RESPONSE
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenResponse {
    pub sources: Vec<AdvertisedDataSource>,
    /// Cluster hosts as `host:port`
    pub hosts: Vec<String>,
}

impl OpenResponse {
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_u32(self.sources.len() as u32);
        for source in &self.sources {
            source.encode(&mut buf);
        }
        buf.put_u32(self.hosts.len() as u32);
        for host in &self.hosts {
            encode_string(host, &mut buf);
        }
        buf.freeze()
    }

    pub fn decode(mut buf: Bytes) -> Result<Self, ProtocolError> {
        let count = decode_u32(&mut buf, "source count")? as usize;
        let mut sources = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            sources.push(AdvertisedDataSource::decode(&mut buf)?);
        }

        let host_count = decode_u32(&mut buf, "host count")? as usize;
        let mut hosts = Vec::with_capacity(host_count.min(1024));
        for _ in 0..host_count {
            hosts.push(decode_string(&mut buf, "host")?);
        }

        if buf.has_remaining() {
            return Err(DecodeError::trailing("open response", buf.remaining()).into());
        }

        Ok(Self { sources, hosts })
    }
}

#[cfg(test)]
#[path = "source_test.rs"]
mod source_test;
