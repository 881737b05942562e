//! Export Client - Pipeline
//!
//! Drives export streams from engine connections into decoders.
//!
//! # Architecture
//!
//! ```text
//! [Engine servers]           [ExportClient]                 [Data sinks]
//!    db1 ──┐                                           ┌──→ ExportDataSink ──→ ExportDecoder
//!    db2 ──┼──→ read_message ──→ route by StreamKey ───┼──→ ExportDataSink ──→ ExportDecoder
//!    db3 ──┘        ▲                                  └──→ ...
//!                   └──────── outbound POLL / ACK ◄────────┘
//! ```
//!
//! # Key Design
//!
//! - **One sink per stream**: a stream is keyed by (partition, signature)
//!   and shared by every connection serving it
//! - **One outstanding poll per connection**: the next POLL leaves only
//!   after the previous POLL_RESPONSE has been handled
//! - **Ack after commit**: the watermark advances only once the decoder
//!   completed the block; a failed completion replays the whole block
//! - **Channel-based**: connections and sinks talk over `tokio::sync::mpsc`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use export_pipeline::{ClientOptions, ExportClient};
//! use tokio_util::sync::CancellationToken;
//!
//! let options = ClientOptions {
//!     servers: vec!["db1:21212".into()],
//!     ..Default::default()
//! };
//! let client = ExportClient::new(options, Arc::new(my_factory));
//!
//! let cancel = CancellationToken::new();
//! client.run(cancel).await?;
//! ```

mod backoff;
mod client;
mod connection;
mod data_sink;
mod decoder;
mod error;
mod metrics;
mod registry;
mod replay;
mod sink_handle;

pub use backoff::BackoffPolicy;
pub use client::{ClientOptions, ExportClient};
pub use connection::{Credentials, EngineConnection, read_frame, read_message, write_message};
pub use data_sink::{ExportDataSink, PollState, SinkSettings};
pub use decoder::{DecoderFactory, ExportDecoder, RestartBlock};
pub use error::{PipelineError, Result};
pub use metrics::{ExportMetrics, MetricsSnapshot};
pub use registry::SinkRegistry;
pub use replay::{BlockOutcome, replay_block, run_block};
pub use sink_handle::{SinkCommand, SinkHandle};

// Re-export key types from dependencies for convenience
pub use export_protocol::{AdvertisedDataSource, ExportRow, StreamKey, Value};

/// Default capacity of per-connection message queues
pub const DEFAULT_QUEUE_SIZE: usize = 1024;

#[cfg(test)]
mod testing;
