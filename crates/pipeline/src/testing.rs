//! Shared helpers for pipeline unit tests

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use export_protocol::{
    AdvertisedDataSource, BlockBuilder, CodecOptions, ColumnInfo, ColumnType,
    EXPORT_FORMAT_VERSION, ExportRow, NO_PARTITION_COLUMN, TableSchema, Value,
};

use crate::decoder::{ExportDecoder, RestartBlock};

pub const PARTITION: i32 = 3;
pub const SIGNATURE: &str = "orders-sig";
pub const GENERATION: i64 = 5;

pub fn schema() -> Arc<TableSchema> {
    Arc::new(TableSchema::new(
        "ORDERS",
        GENERATION,
        NO_PARTITION_COLUMN,
        vec![
            ColumnInfo::new("ID", ColumnType::BigInt, 8),
            ColumnInfo::new("NAME", ColumnType::String, 32),
        ],
    ))
}

pub fn source() -> AdvertisedDataSource {
    AdvertisedDataSource::from_schema(PARTITION, SIGNATURE, EXPORT_FORMAT_VERSION, &schema())
}

/// Encoded block carrying one row per id
pub fn block(ids: impl IntoIterator<Item = i64>) -> Bytes {
    let mut builder = BlockBuilder::new(schema(), CodecOptions::default());
    for id in ids {
        builder
            .push_row(&[Value::BigInt(id), Value::from(format!("order-{id}"))])
            .unwrap();
    }
    builder.finish()
}

/// Decoded rows, without going through the wire format
pub fn rows(ids: impl IntoIterator<Item = i64>) -> Vec<ExportRow> {
    let schema = schema();
    ids.into_iter()
        .map(|id| ExportRow {
            schema: Arc::clone(&schema),
            values: vec![Value::BigInt(id), Value::from(format!("order-{id}"))],
            partition_id: PARTITION,
            partition_value: Value::Integer(PARTITION),
        })
        .collect()
}

pub fn row_id(row: &ExportRow) -> i64 {
    row.values[0].as_i64().unwrap()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start(i64),
    Row(i64),
    Complete(i64),
    Retired,
}

/// Failure script for a [`RecordingDecoder`]
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Fail this many `on_block_start` calls
    pub fail_starts: u32,
    /// Fail the row with this id once
    pub fail_row: Option<i64>,
    /// Fail this many `on_block_completion` calls
    pub fail_completions: u32,
    /// Restarts request backoff
    pub backoff: bool,
    /// `process_row` returns false after this many rows of a block
    pub stop_after: Option<usize>,
}

/// Shared view of what a decoder saw and committed
#[derive(Debug, Default)]
pub struct Journal {
    pub events: Vec<Event>,
    pub committed: Vec<i64>,
}

impl Journal {
    pub fn count(&self, matches: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| matches(e)).count()
    }
}

/// Decoder that buffers rows and commits them on completion
pub struct RecordingDecoder {
    journal: Arc<Mutex<Journal>>,
    script: Script,
    pending: Vec<i64>,
    /// A row of the current attempt asked for a restart
    poisoned: bool,
}

impl RecordingDecoder {
    pub fn new(script: Script) -> (Self, Arc<Mutex<Journal>>) {
        let journal = Arc::new(Mutex::new(Journal::default()));
        let decoder = Self {
            journal: Arc::clone(&journal),
            script,
            pending: Vec::new(),
            poisoned: false,
        };
        (decoder, journal)
    }

    fn restart(&self, reason: &str) -> RestartBlock {
        if self.script.backoff {
            RestartBlock::with_backoff(reason)
        } else {
            RestartBlock::immediate(reason)
        }
    }
}

impl ExportDecoder for RecordingDecoder {
    fn on_block_start(&mut self, row: &ExportRow) -> Result<(), RestartBlock> {
        self.journal.lock().events.push(Event::Start(row_id(row)));
        self.pending.clear();
        self.poisoned = false;
        if self.script.fail_starts > 0 {
            self.script.fail_starts -= 1;
            return Err(self.restart("start failed"));
        }
        Ok(())
    }

    fn process_row(&mut self, row: &ExportRow) -> Result<bool, RestartBlock> {
        let id = row_id(row);
        self.journal.lock().events.push(Event::Row(id));
        if self.script.fail_row == Some(id) {
            self.script.fail_row = None;
            self.poisoned = true;
            return Err(self.restart("row failed"));
        }
        self.pending.push(id);
        Ok(self
            .script
            .stop_after
            .is_none_or(|limit| self.pending.len() < limit))
    }

    fn on_block_completion(&mut self, row: &ExportRow) -> Result<(), RestartBlock> {
        let mut journal = self.journal.lock();
        journal.events.push(Event::Complete(row_id(row)));
        if self.script.fail_completions > 0 {
            self.script.fail_completions -= 1;
            drop(journal);
            return Err(self.restart("completion failed"));
        }
        if self.poisoned {
            self.pending.clear();
            return Ok(());
        }
        journal.committed.append(&mut self.pending);
        Ok(())
    }

    fn source_no_longer_advertised(&mut self, _source: &AdvertisedDataSource) {
        self.journal.lock().events.push(Event::Retired);
    }
}
