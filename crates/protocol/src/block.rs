//! Data block decoding
//!
//! A data block is the payload of one POLL_RESPONSE:
//!
//! ```text
//! [i32 schema_len][schema bytes]     schema_len == 0 reuses the previous schema
//! { [i32 row_len][row bytes] }*      until the end of the block
//! ```
//!
//! [`BlockDecoder`] remembers the last schema per stream so continuation
//! blocks can be decoded. A schema is only adopted once its whole block
//! decodes, so a failed block leaves the decoder as it was.

use std::sync::Arc;

use bytes::Bytes;

use crate::error::DecodeError;
use crate::row::{ExportRow, decode_row};
use crate::schema::{CodecOptions, DecodeFlags, TableSchema, decode_buffer_schema};
use crate::wire::{get_len_le, get_prefixed_le};

/// Stateful decoder for the blocks of one (partition, table) stream
#[derive(Debug, Clone)]
pub struct BlockDecoder {
    partition_id: i32,
    format_version: u8,
    flags: DecodeFlags,
    options: CodecOptions,
    schema: Option<Arc<TableSchema>>,
}

impl BlockDecoder {
    pub fn new(
        partition_id: i32,
        format_version: u8,
        flags: DecodeFlags,
        options: CodecOptions,
    ) -> Self {
        Self {
            partition_id,
            format_version,
            flags,
            options,
            schema: None,
        }
    }

    /// Schema of the last successfully decoded block
    pub fn schema(&self) -> Option<&Arc<TableSchema>> {
        self.schema.as_ref()
    }

    /// Decode every row of `block`
    ///
    /// An empty block yields no rows and does not touch the schema.
    pub fn decode(&mut self, mut block: Bytes) -> Result<Vec<ExportRow>, DecodeError> {
        if block.is_empty() {
            return Ok(Vec::new());
        }

        let schema_len = get_len_le(&mut block, "schema length")?;
        let schema = if schema_len == 0 {
            self.schema.clone().ok_or(DecodeError::MissingSchema)?
        } else {
            Arc::new(decode_buffer_schema(
                &mut block,
                schema_len,
                self.format_version,
                self.flags,
            )?)
        };

        let mut rows = Vec::new();
        while !block.is_empty() {
            let row = get_prefixed_le(&mut block, "row")?;
            rows.push(decode_row(
                &schema,
                self.partition_id,
                &self.options,
                self.flags,
                row,
            )?);
        }

        self.schema = Some(schema);
        Ok(rows)
    }
}

#[cfg(test)]
#[path = "block_test.rs"]
mod block_test;
