//! Null sink - acknowledges and discards
//!
//! Every row is consumed and counted, nothing is written. Useful for
//! measuring the client without I/O, or for draining a stream.

use std::sync::Arc;

use export_pipeline::{DecoderFactory, ExportDecoder, RestartBlock};
use export_protocol::{AdvertisedDataSource, ExportRow};

use crate::common::SinkMetrics;

/// Decoder factory discarding every row
#[derive(Default)]
pub struct NullSink {
    metrics: Arc<SinkMetrics>,
}

impl NullSink {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }
}

impl DecoderFactory for NullSink {
    fn construct_export_decoder(&self, _source: &AdvertisedDataSource) -> Box<dyn ExportDecoder> {
        Box::new(NullDecoder {
            metrics: Arc::clone(&self.metrics),
            rows: 0,
        })
    }
}

/// Per-source decoder of a [`NullSink`]
pub struct NullDecoder {
    metrics: Arc<SinkMetrics>,
    rows: u64,
}

impl ExportDecoder for NullDecoder {
    fn on_block_start(&mut self, _row: &ExportRow) -> Result<(), RestartBlock> {
        self.rows = 0;
        Ok(())
    }

    #[inline]
    fn process_row(&mut self, _row: &ExportRow) -> Result<bool, RestartBlock> {
        self.rows += 1;
        Ok(true)
    }

    fn on_block_completion(&mut self, _row: &ExportRow) -> Result<(), RestartBlock> {
        self.metrics.block_completed(self.rows, 0);
        Ok(())
    }

    fn source_no_longer_advertised(&mut self, _source: &AdvertisedDataSource) {}
}
