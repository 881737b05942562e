//! Stdout sink - delimited rows on standard output
//!
//! For debugging. Rows of a block are rendered into a buffer and written
//! in one piece at `on_block_completion`, so blocks from different
//! partitions never interleave line by line.

use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use export_pipeline::{DecoderFactory, ExportDecoder, RestartBlock};
use export_protocol::{AdvertisedDataSource, ExportRow};

use crate::common::SinkMetrics;
use crate::util::delimited::RowFormatter;

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Decoder factory printing rows
pub struct StdoutSink {
    writer: SharedWriter,
    formatter: RowFormatter,
    metrics: Arc<SinkMetrics>,
}

impl StdoutSink {
    pub fn new(formatter: RowFormatter) -> Self {
        Self::with_writer(io::stdout(), formatter)
    }

    /// Print to `writer` instead of stdout
    pub fn with_writer(writer: impl Write + Send + 'static, formatter: RowFormatter) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            formatter,
            metrics: Arc::new(SinkMetrics::new()),
        }
    }

    #[inline]
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }
}

impl DecoderFactory for StdoutSink {
    fn construct_export_decoder(&self, source: &AdvertisedDataSource) -> Box<dyn ExportDecoder> {
        debug!(table = %source.table_name, partition = source.partition_id, "stdout decoder created");
        Box::new(StdoutDecoder {
            writer: Arc::clone(&self.writer),
            formatter: self.formatter,
            metrics: Arc::clone(&self.metrics),
            buffer: String::new(),
            rows: 0,
        })
    }
}

/// Per-source decoder of a [`StdoutSink`]
pub struct StdoutDecoder {
    writer: SharedWriter,
    formatter: RowFormatter,
    metrics: Arc<SinkMetrics>,
    buffer: String,
    rows: u64,
}

impl ExportDecoder for StdoutDecoder {
    fn on_block_start(&mut self, _row: &ExportRow) -> Result<(), RestartBlock> {
        self.buffer.clear();
        self.rows = 0;
        Ok(())
    }

    fn process_row(&mut self, row: &ExportRow) -> Result<bool, RestartBlock> {
        self.formatter.write_row(row, &mut self.buffer);
        self.rows += 1;
        Ok(true)
    }

    fn on_block_completion(&mut self, _row: &ExportRow) -> Result<(), RestartBlock> {
        let written = {
            let mut writer = self.writer.lock();
            writer
                .write_all(self.buffer.as_bytes())
                .and_then(|()| writer.flush())
        };

        match written {
            Ok(()) => {
                self.metrics
                    .block_completed(self.rows, self.buffer.len() as u64);
                Ok(())
            }
            Err(e) => {
                self.metrics.write_error();
                self.metrics.block_restarted();
                Err(RestartBlock::with_backoff(format!("stdout write failed: {e}")))
            }
        }
    }

    fn source_no_longer_advertised(&mut self, source: &AdvertisedDataSource) {
        debug!(table = %source.table_name, partition = source.partition_id, "source retired");
    }
}
