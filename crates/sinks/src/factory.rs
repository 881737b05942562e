//! Sink selection from configuration

use std::sync::Arc;

use tracing::info;

use export_config::{CodecConfig, SinkConfig, SinkType};
use export_pipeline::{DecoderFactory, ExportDecoder};
use export_protocol::AdvertisedDataSource;

use crate::common::{MetricsSnapshot, Result, SinkMetrics};
use crate::file::FileSink;
use crate::null::NullSink;
use crate::stdout::StdoutSink;
use crate::util::delimited::RowFormatter;

/// The sink adapter chosen by `[sink] type`
pub enum ExportSink {
    File(FileSink),
    Stdout(StdoutSink),
    Null(NullSink),
}

impl ExportSink {
    /// Build the adapter for `config`
    pub fn from_config(config: &SinkConfig, codec: &CodecConfig) -> Result<Self> {
        let sink = match config.sink_type {
            SinkType::File => Self::File(FileSink::open(config, codec)?),
            SinkType::Stdout => Self::Stdout(StdoutSink::new(RowFormatter::new(
                config.format,
                codec.skip_internals,
            ))),
            SinkType::Null => Self::Null(NullSink::new()),
        };
        info!(sink = sink.name(), "sink ready");
        Ok(sink)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::File(_) => "file",
            Self::Stdout(_) => "stdout",
            Self::Null(_) => "null",
        }
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        match self {
            Self::File(sink) => sink.metrics(),
            Self::Stdout(sink) => sink.metrics(),
            Self::Null(sink) => sink.metrics(),
        }
    }

    #[inline]
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.metrics().snapshot()
    }

    /// Periodic upkeep: roll expired file units (and prune behind them)
    pub fn maintain(&self) -> usize {
        match self {
            Self::File(sink) => sink.roll_if_due(),
            Self::Stdout(_) | Self::Null(_) => 0,
        }
    }

    /// Close open output
    pub fn shutdown(&self) {
        if let Self::File(sink) = self {
            sink.close();
        }
        let snapshot = self.snapshot();
        info!(
            sink = self.name(),
            blocks = snapshot.blocks_completed,
            rows = snapshot.rows_written,
            bytes = snapshot.bytes_written,
            restarts = snapshot.block_restarts,
            write_errors = snapshot.write_errors,
            rolled = snapshot.units_rolled,
            pruned = snapshot.units_pruned,
            "sink shut down"
        );
    }
}

impl DecoderFactory for ExportSink {
    fn construct_export_decoder(&self, source: &AdvertisedDataSource) -> Box<dyn ExportDecoder> {
        match self {
            Self::File(sink) => sink.construct_export_decoder(source),
            Self::Stdout(sink) => sink.construct_export_decoder(source),
            Self::Null(sink) => sink.construct_export_decoder(source),
        }
    }
}
