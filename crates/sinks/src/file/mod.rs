//! File sink - rolling delimited files
//!
//! One [`FileSink`] serves every advertised source. Each source gets its
//! own [`FileDecoder`]; all of them write through a shared
//! [`RotatingOutput`].
//!
//! A decoder renders the rows of a block into memory and hands the whole
//! block to the output at `on_block_completion`. A replayed block
//! therefore never leaves a partial copy behind: either the block was
//! written once, or the write failed and was rolled back.
//!
//! ```text
//! process_row ─▶ [block buffer] ─(completion)─▶ RotatingOutput::write_block
//!                                                   │ error
//!                                                   ▼
//!                                      RestartBlock (with backoff)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use export_config::{CodecConfig, SinkConfig};
use export_pipeline::{DecoderFactory, ExportDecoder, RestartBlock};
use export_protocol::{AdvertisedDataSource, ExportRow};

use crate::common::{Result, SinkError, SinkMetrics};
use crate::util::delimited::RowFormatter;
use crate::util::rotation::{BlockWrite, RotatingOutput, RotationConfig};
use crate::util::schema_file::render_schema;

/// Decoder factory writing rolling files
pub struct FileSink {
    output: Arc<RotatingOutput>,
    formatter: RowFormatter,
    metrics: Arc<SinkMetrics>,
}

impl FileSink {
    /// Open the output directory described by `config`
    pub fn open(config: &SinkConfig, codec: &CodecConfig) -> Result<Self> {
        if config.nonce.is_empty() || config.nonce.contains(['-', '/', '\\']) {
            return Err(SinkError::config(format!(
                "nonce {:?} must be non-empty and free of '-' and '/'",
                config.nonce
            )));
        }

        let rotation = RotationConfig {
            base_path: PathBuf::from(&config.path),
            nonce: config.nonce.clone(),
            extension: config.format.extension().to_string(),
            period: config.period,
            batched: config.batched,
            retention: config.retention,
            max_files_per_table: config.max_files_per_table,
        };
        let formatter = RowFormatter::new(config.format, codec.skip_internals);
        Self::with_rotation(rotation, formatter)
    }

    /// Open with explicit rotation settings
    pub fn with_rotation(rotation: RotationConfig, formatter: RowFormatter) -> Result<Self> {
        let metrics = Arc::new(SinkMetrics::new());
        let output = RotatingOutput::open(rotation, Arc::clone(&metrics))
            .map_err(|e| SinkError::init(format!("cannot open file output: {e}")))?;

        Ok(Self {
            output: Arc::new(output),
            formatter,
            metrics,
        })
    }

    #[inline]
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    #[inline]
    pub fn output(&self) -> &RotatingOutput {
        &self.output
    }

    /// Roll expired units; returns how many were rolled
    pub fn roll_if_due(&self) -> usize {
        self.output.roll_if_due()
    }

    /// Close every unit
    pub fn close(&self) {
        self.output.close();
    }
}

impl DecoderFactory for FileSink {
    fn construct_export_decoder(&self, source: &AdvertisedDataSource) -> Box<dyn ExportDecoder> {
        debug!(
            table = %source.table_name,
            partition = source.partition_id,
            generation = source.generation,
            "file decoder created"
        );
        Box::new(FileDecoder {
            output: Arc::clone(&self.output),
            formatter: self.formatter,
            metrics: Arc::clone(&self.metrics),
            schema_json: None,
            buffer: String::new(),
            rows: 0,
        })
    }
}

/// Per-source decoder of a [`FileSink`]
pub struct FileDecoder {
    output: Arc<RotatingOutput>,
    formatter: RowFormatter,
    metrics: Arc<SinkMetrics>,
    /// Rendered sidecar and the generation it describes
    schema_json: Option<(i64, String)>,
    buffer: String,
    rows: u64,
}

impl FileDecoder {
    fn ensure_schema(&mut self, row: &ExportRow) -> std::result::Result<(), RestartBlock> {
        let generation = row.generation();
        if self
            .schema_json
            .as_ref()
            .is_some_and(|(cached, _)| *cached == generation)
        {
            return Ok(());
        }
        let json = render_schema(&row.schema, self.formatter.first_column())
            .map_err(|e| RestartBlock::with_backoff(format!("schema render failed: {e}")))?;
        self.schema_json = Some((generation, json));
        Ok(())
    }
}

impl ExportDecoder for FileDecoder {
    fn on_block_start(&mut self, _row: &ExportRow) -> std::result::Result<(), RestartBlock> {
        self.buffer.clear();
        self.rows = 0;
        Ok(())
    }

    fn process_row(&mut self, row: &ExportRow) -> std::result::Result<bool, RestartBlock> {
        self.formatter.write_row(row, &mut self.buffer);
        self.rows += 1;
        Ok(true)
    }

    fn on_block_completion(&mut self, row: &ExportRow) -> std::result::Result<(), RestartBlock> {
        if self.rows == 0 {
            return Ok(());
        }

        self.ensure_schema(row)?;
        let Some((_, schema_json)) = &self.schema_json else {
            return Err(RestartBlock::with_backoff("schema unavailable"));
        };
        let block = BlockWrite {
            table: row.table_name(),
            generation: row.generation(),
            schema_json,
            data: self.buffer.as_bytes(),
        };

        match self.output.write_block(&block) {
            Ok(()) => {
                self.metrics
                    .block_completed(self.rows, self.buffer.len() as u64);
                self.buffer.clear();
                self.rows = 0;
                Ok(())
            }
            Err(e) => {
                self.metrics.block_restarted();
                warn!(table = row.table_name(), error = %e, "block write failed, replaying");
                Err(RestartBlock::with_backoff(format!("write failed: {e}")))
            }
        }
    }

    fn source_no_longer_advertised(&mut self, source: &AdvertisedDataSource) {
        self.output.retire(&source.table_name, source.generation);
        info!(
            table = %source.table_name,
            partition = source.partition_id,
            generation = source.generation,
            "source retired, output closed"
        );
    }
}

#[cfg(test)]
#[path = "file_test.rs"]
mod file_test;
