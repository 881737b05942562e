//! Export Sinks - decoder factories that put exported rows somewhere
//!
//! Each adapter implements [`export_pipeline::DecoderFactory`]: the
//! pipeline asks it for one decoder per advertised source and drives the
//! decoder block by block.
//!
//! # Available Sinks
//!
//! | Sink | Purpose | Rolls over |
//! |------|---------|------------|
//! | `file` | Delimited files, one per table generation or one directory per period | Yes |
//! | `stdout` | Debug output | No |
//! | `null` | Acknowledge and discard | No |
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use export_sinks::ExportSink;
//!
//! let sink = Arc::new(ExportSink::from_config(&config.sink, &config.codec)?);
//! let client = ExportClient::new(options, sink.clone());
//! client.run(cancel).await?;
//! sink.shutdown();
//! ```

mod common;
mod factory;

/// File sink - rolling delimited files with schema sidecars
pub mod file;

/// Null sink - discards all rows
pub mod null;

/// Stdout sink - delimited rows for debugging
pub mod stdout;

/// Naming, rotation, pruning and row rendering shared by the sinks
pub mod util;

pub use common::{MetricsSnapshot, Result, SinkError, SinkMetrics};
pub use factory::ExportSink;
pub use file::{FileDecoder, FileSink};
pub use null::{NullDecoder, NullSink};
pub use stdout::{StdoutDecoder, StdoutSink};
pub use util::{PrunePolicy, PruneReport, RowFormatter, prune};
