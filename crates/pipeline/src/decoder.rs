//! Export decoder contract
//!
//! A decoder consumes the rows of one advertised source. Rows arrive in
//! blocks, each bracketed by exactly one `on_block_start` and one
//! `on_block_completion`:
//!
//! ```text
//! on_block_start(first) → process_row(row)* → on_block_completion(last)
//! ```
//!
//! Any step may return [`RestartBlock`]. The whole block is then replayed
//! from `on_block_start`, after a delay when `request_backoff` is set.
//! Replays must produce the same output as the first attempt, so side
//! effects have to wait for `on_block_completion` or be idempotent.

use std::fmt;

use export_protocol::{AdvertisedDataSource, ExportRow};

/// Request to replay the current block from its start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartBlock {
    /// Wait before replaying
    pub request_backoff: bool,
    pub reason: String,
}

impl RestartBlock {
    /// Replay after the backoff delay
    pub fn with_backoff(reason: impl Into<String>) -> Self {
        Self {
            request_backoff: true,
            reason: reason.into(),
        }
    }

    /// Replay immediately
    pub fn immediate(reason: impl Into<String>) -> Self {
        Self {
            request_backoff: false,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for RestartBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block restart requested (backoff: {}): {}",
            self.request_backoff, self.reason
        )
    }
}

impl std::error::Error for RestartBlock {}

/// Per-source consumer of decoded rows
pub trait ExportDecoder: Send {
    /// Open a block; `row` is its first row
    fn on_block_start(&mut self, row: &ExportRow) -> Result<(), RestartBlock>;

    /// Consume one row; `Ok(false)` skips the rest of the block
    fn process_row(&mut self, row: &ExportRow) -> Result<bool, RestartBlock>;

    /// Close the block; `row` is its last row
    fn on_block_completion(&mut self, row: &ExportRow) -> Result<(), RestartBlock>;

    /// The engine retired this source; called once, nothing follows it
    fn source_no_longer_advertised(&mut self, source: &AdvertisedDataSource);
}

/// Builds one decoder per advertised source
pub trait DecoderFactory: Send + Sync {
    fn construct_export_decoder(&self, source: &AdvertisedDataSource) -> Box<dyn ExportDecoder>;
}

impl<F> DecoderFactory for F
where
    F: Fn(&AdvertisedDataSource) -> Box<dyn ExportDecoder> + Send + Sync,
{
    fn construct_export_decoder(&self, source: &AdvertisedDataSource) -> Box<dyn ExportDecoder> {
        self(source)
    }
}
