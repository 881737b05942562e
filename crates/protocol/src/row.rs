//! Decoded rows

use std::sync::Arc;

use bytes::{Buf, Bytes};

use crate::error::DecodeError;
use crate::schema::{CodecOptions, DecodeFlags, TableSchema};
use crate::types::{ColumnType, Decimal, Value};
use crate::wire::{ensure, get_prefixed_le, get_string_le};

/// One decoded tuple
///
/// Immutable once built. Rows share their schema through an `Arc`, so a
/// block of rows holds a single copy of the column metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub schema: Arc<TableSchema>,
    pub values: Vec<Value>,
    pub partition_id: i32,
    /// Value of the partitioning column, or `Value::Integer(partition_id)`
    /// when the schema has no valid partition column
    pub partition_value: Value,
}

impl ExportRow {
    /// Decode one row against `schema`
    pub fn decode(
        schema: &Arc<TableSchema>,
        partition_id: i32,
        options: &CodecOptions,
        flags: DecodeFlags,
        row: Bytes,
    ) -> Result<Self, DecodeError> {
        decode_row(schema, partition_id, options, flags, row)
    }

    /// Decode the next row of the same stream, reusing this row's schema
    pub fn decode_next(
        &self,
        options: &CodecOptions,
        flags: DecodeFlags,
        row: Bytes,
    ) -> Result<Self, DecodeError> {
        decode_row(&self.schema, self.partition_id, options, flags, row)
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.schema.table_name
    }

    #[inline]
    pub fn generation(&self) -> i64 {
        self.schema.generation
    }

    /// Values starting at column `first`, empty if `first` is past the end
    pub fn values_from(&self, first: usize) -> &[Value] {
        self.values.get(first..).unwrap_or(&[])
    }
}

/// Decode one row's bytes into an [`ExportRow`]
///
/// The row must be consumed exactly: truncation and leftover bytes are
/// both errors.
pub fn decode_row(
    schema: &Arc<TableSchema>,
    partition_id: i32,
    options: &CodecOptions,
    flags: DecodeFlags,
    mut row: Bytes,
) -> Result<ExportRow, DecodeError> {
    let column_count = schema.column_count();
    let nulls = extract_null_flags(&row, column_count)?;
    row.advance(schema.null_bitmap_len());

    let lenient = flags.contains(DecodeFlags::LENIENT_UTF8);
    let mut values = Vec::with_capacity(column_count);
    for (column, is_null) in schema.columns.iter().zip(nulls) {
        if is_null {
            values.push(Value::Null);
        } else {
            values.push(decode_value(&mut row, column.column_type, options, lenient)?);
        }
    }

    if row.has_remaining() {
        return Err(DecodeError::trailing("row", row.remaining()));
    }

    let partition_value = match schema.partition_column_index() {
        Some(idx) => values[idx].clone(),
        None => Value::Integer(partition_id),
    };

    Ok(ExportRow {
        schema: Arc::clone(schema),
        values,
        partition_id,
        partition_value,
    })
}

/// Read the null bitmap at the front of a row
///
/// Bit `i` counted from the most significant bit of byte `i / 8` is set
/// when column `i` is null.
pub fn extract_null_flags(buf: &[u8], column_count: usize) -> Result<Vec<bool>, DecodeError> {
    let len = column_count.div_ceil(8);
    let bitmap = buf
        .get(..len)
        .ok_or_else(|| DecodeError::truncated("null bitmap", len, buf.len()))?;
    Ok((0..column_count)
        .map(|i| bitmap[i / 8] & (0x80 >> (i % 8)) != 0)
        .collect())
}

fn decode_value(
    row: &mut Bytes,
    column_type: ColumnType,
    options: &CodecOptions,
    lenient: bool,
) -> Result<Value, DecodeError> {
    if let Some(width) = column_type.fixed_width() {
        ensure(row, width, "row value")?;
    }
    let value = match column_type {
        ColumnType::TinyInt => Value::TinyInt(row.get_i8()),
        ColumnType::SmallInt => Value::SmallInt(row.get_i16_le()),
        ColumnType::Integer => Value::Integer(row.get_i32_le()),
        ColumnType::BigInt => Value::BigInt(row.get_i64_le()),
        ColumnType::Float => Value::Float(row.get_f64_le()),
        ColumnType::Timestamp => Value::Timestamp(row.get_i64_le()),
        ColumnType::Decimal => {
            Value::Decimal(Decimal::new(row.get_i128_le(), options.decimal_scale))
        }
        ColumnType::GeographyPoint => {
            let longitude = row.get_f64_le();
            let latitude = row.get_f64_le();
            Value::GeographyPoint {
                longitude,
                latitude,
            }
        }
        ColumnType::String => Value::String(get_string_le(row, "string value", lenient)?),
        ColumnType::VarBinary => Value::VarBinary(get_prefixed_le(row, "varbinary value")?),
        ColumnType::Geography => Value::Geography(get_prefixed_le(row, "geography value")?),
    };
    Ok(value)
}

#[cfg(test)]
#[path = "row_test.rs"]
mod row_test;
