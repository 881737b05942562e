//! Row block encoding
//!
//! The inverse of the block decoder. The engine side of the protocol and
//! the test harnesses use it to produce data blocks.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::EncodeError;
use crate::schema::{CodecOptions, TableSchema};
use crate::types::{ColumnType, Value};
use crate::wire::put_prefixed_le;

/// Encode a schema block body (without its length prefix)
pub fn encode_schema(schema: &TableSchema, buf: &mut BytesMut) {
    buf.put_i64_le(schema.generation);
    buf.put_i32_le(schema.partition_column);
    put_prefixed_le(buf, schema.table_name.as_bytes());
    buf.put_i32_le(schema.columns.len() as i32);
    for column in &schema.columns {
        put_prefixed_le(buf, column.name.as_bytes());
        buf.put_u8(column.column_type.as_u8());
        buf.put_i32_le(column.length);
    }
}

/// Build a null bitmap, MSB-first within each byte
pub fn encode_null_flags(nulls: &[bool]) -> Vec<u8> {
    let mut bitmap = vec![0u8; nulls.len().div_ceil(8)];
    for (i, _) in nulls.iter().enumerate().filter(|(_, null)| **null) {
        bitmap[i / 8] |= 0x80 >> (i % 8);
    }
    bitmap
}

/// Encode one row body (without its length prefix)
pub fn encode_row(
    schema: &TableSchema,
    values: &[Value],
    options: &CodecOptions,
    buf: &mut BytesMut,
) -> Result<(), EncodeError> {
    if values.len() != schema.columns.len() {
        return Err(EncodeError::ColumnCount {
            expected: schema.columns.len(),
            actual: values.len(),
        });
    }

    let nulls: Vec<bool> = values.iter().map(Value::is_null).collect();
    buf.put_slice(&encode_null_flags(&nulls));

    for (column, value) in schema.columns.iter().zip(values) {
        let mismatch = || EncodeError::TypeMismatch {
            column: column.name.clone(),
            expected: column.column_type,
        };
        match (column.column_type, value) {
            (_, Value::Null) => {}
            (ColumnType::TinyInt, Value::TinyInt(v)) => buf.put_i8(*v),
            (ColumnType::SmallInt, Value::SmallInt(v)) => buf.put_i16_le(*v),
            (ColumnType::Integer, Value::Integer(v)) => buf.put_i32_le(*v),
            (ColumnType::BigInt, Value::BigInt(v)) => buf.put_i64_le(*v),
            (ColumnType::Float, Value::Float(v)) => buf.put_f64_le(*v),
            (ColumnType::Timestamp, Value::Timestamp(v)) => buf.put_i64_le(*v),
            (ColumnType::Decimal, Value::Decimal(d)) => {
                let scaled = d.rescale(options.decimal_scale).ok_or_else(|| {
                    EncodeError::DecimalOverflow {
                        column: column.name.clone(),
                        scale: options.decimal_scale,
                    }
                })?;
                buf.put_i128_le(scaled.unscaled());
            }
            (
                ColumnType::GeographyPoint,
                Value::GeographyPoint {
                    longitude,
                    latitude,
                },
            ) => {
                buf.put_f64_le(*longitude);
                buf.put_f64_le(*latitude);
            }
            (ColumnType::String, Value::String(s)) => {
                put_var(buf, &column.name, s.as_bytes())?;
            }
            (ColumnType::VarBinary, Value::VarBinary(b))
            | (ColumnType::Geography, Value::Geography(b)) => {
                put_var(buf, &column.name, b)?;
            }
            _ => return Err(mismatch()),
        }
    }
    Ok(())
}

fn put_var(buf: &mut BytesMut, column: &str, bytes: &[u8]) -> Result<(), EncodeError> {
    if bytes.len() > i32::MAX as usize {
        return Err(EncodeError::ValueTooLarge {
            column: column.to_string(),
            size: bytes.len(),
        });
    }
    put_prefixed_le(buf, bytes);
    Ok(())
}

/// Incrementally builds one data block
///
/// The block starts with the schema, or with a zero schema length when the
/// receiver already holds it.
pub struct BlockBuilder {
    schema: Arc<TableSchema>,
    options: CodecOptions,
    buf: BytesMut,
    rows: usize,
}

impl BlockBuilder {
    /// Start a block that carries its schema
    pub fn new(schema: Arc<TableSchema>, options: CodecOptions) -> Self {
        let mut body = BytesMut::new();
        encode_schema(&schema, &mut body);
        let mut buf = BytesMut::with_capacity(body.len() + 256);
        put_prefixed_le(&mut buf, &body);
        Self {
            schema,
            options,
            buf,
            rows: 0,
        }
    }

    /// Start a block that reuses the previously sent schema
    pub fn continuation(schema: Arc<TableSchema>, options: CodecOptions) -> Self {
        let mut buf = BytesMut::with_capacity(256);
        buf.put_i32_le(0);
        Self {
            schema,
            options,
            buf,
            rows: 0,
        }
    }

    /// Append one row
    ///
    /// A failed row leaves the block unchanged.
    pub fn push_row(&mut self, values: &[Value]) -> Result<&mut Self, EncodeError> {
        let mut row = BytesMut::new();
        encode_row(&self.schema, values, &self.options, &mut row)?;
        put_prefixed_le(&mut self.buf, &row);
        self.rows += 1;
        Ok(self)
    }

    /// Number of rows appended so far
    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Finish and return the encoded block
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

#[cfg(test)]
#[path = "encode_test.rs"]
mod encode_test;
