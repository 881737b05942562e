//! Schema descriptors and schema block decoding
//!
//! A schema block describes one table generation: its name, the index of
//! the partitioning column, and the ordered column list. Rows never carry
//! column metadata; they are decoded against the most recent schema.
//!
//! # Wire Format (little-endian)
//!
//! ```text
//! [i64 generation][i32 partition_column]
//! [i32 name_len][table name]
//! [i32 column_count]
//! { [i32 name_len][column name][u8 type][i32 declared_length] } * column_count
//! ```

use bytes::{Buf, Bytes};

use crate::error::DecodeError;
use crate::types::ColumnType;
use crate::wire::{ensure, get_len_le, get_string_le};

/// Export format version understood by this codec
pub const EXPORT_FORMAT_VERSION: u8 = 1;

/// Number of metadata columns the engine prepends to every exported row
///
/// Transaction id, export timestamp, sequence number, partition id, site id
/// and operation type, in that order.
pub const INTERNAL_COLUMN_COUNT: usize = 6;

/// Partition column marker for tables without a partitioning column
pub const NO_PARTITION_COLUMN: i32 = -1;

/// Default implied scale for DECIMAL columns
pub const DEFAULT_DECIMAL_SCALE: u32 = 12;

/// Flags altering decode behavior
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeFlags(u32);

impl DecodeFlags {
    /// Strict decoding
    pub const NONE: Self = Self(0);
    /// Replace invalid UTF-8 in strings instead of failing the row
    pub const LENIENT_UTF8: Self = Self(1);

    const KNOWN: u32 = Self::LENIENT_UTF8.0;

    /// Build from raw bits, rejecting unknown ones
    pub fn from_bits(bits: u32) -> Result<Self, DecodeError> {
        if bits & !Self::KNOWN != 0 {
            return Err(DecodeError::UnsupportedFlags(bits));
        }
        Ok(Self(bits))
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Codec settings shared by every decoder of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecOptions {
    /// Implied fractional digits of DECIMAL values
    pub decimal_scale: u32,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            decimal_scale: DEFAULT_DECIMAL_SCALE,
        }
    }
}

/// One column of a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub column_type: ColumnType,
    /// Declared maximum length for variable-length types, 0 otherwise
    pub length: i32,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, column_type: ColumnType, length: i32) -> Self {
        Self {
            name: name.into(),
            column_type,
            length,
        }
    }
}

/// Decoded schema descriptor for one table generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table_name: String,
    pub generation: i64,
    /// Index of the partitioning column, [`NO_PARTITION_COLUMN`] if none
    pub partition_column: i32,
    pub columns: Vec<ColumnInfo>,
}

impl TableSchema {
    pub fn new(
        table_name: impl Into<String>,
        generation: i64,
        partition_column: i32,
        columns: Vec<ColumnInfo>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            generation,
            partition_column,
            columns,
        }
    }

    /// Number of columns
    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Partition column index if it refers to an existing column
    pub fn partition_column_index(&self) -> Option<usize> {
        usize::try_from(self.partition_column)
            .ok()
            .filter(|&idx| idx < self.columns.len())
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Null bitmap width for rows of this schema
    #[inline]
    pub fn null_bitmap_len(&self) -> usize {
        self.columns.len().div_ceil(8)
    }
}

/// Decode a schema block of `schema_len` bytes from the front of `buf`
///
/// On success `buf` is advanced past the schema block. Bytes inside the
/// block that the schema does not account for are an error.
pub fn decode_buffer_schema(
    buf: &mut Bytes,
    schema_len: usize,
    format_version: u8,
    flags: DecodeFlags,
) -> Result<TableSchema, DecodeError> {
    if format_version != EXPORT_FORMAT_VERSION {
        return Err(DecodeError::UnsupportedFormatVersion(format_version));
    }
    ensure(buf, schema_len, "schema block")?;
    let mut block = buf.split_to(schema_len);
    let lenient = flags.contains(DecodeFlags::LENIENT_UTF8);

    ensure(&block, 12, "schema header")?;
    let generation = block.get_i64_le();
    let partition_column = block.get_i32_le();
    let table_name = get_string_le(&mut block, "table name", lenient)?;

    let column_count = get_len_le(&mut block, "column count")?;
    // Each column needs at least 9 bytes, bound the allocation by that
    if column_count > block.remaining() / 9 {
        return Err(DecodeError::invalid_length(
            "column count",
            column_count as i64,
        ));
    }

    let mut columns = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        let name = get_string_le(&mut block, "column name", lenient)?;
        ensure(&block, 5, "column descriptor")?;
        let code = block.get_u8();
        let column_type = ColumnType::from_u8(code).ok_or(DecodeError::UnknownColumnType(code))?;
        let length = block.get_i32_le();
        columns.push(ColumnInfo {
            name,
            column_type,
            length,
        });
    }

    if block.has_remaining() {
        return Err(DecodeError::trailing("schema block", block.remaining()));
    }

    Ok(TableSchema {
        table_name,
        generation,
        partition_column,
        columns,
    })
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod schema_test;
