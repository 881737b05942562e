//! Common types and utilities for sinks
//!
//! Shared functionality across all sink adapters.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Metrics shared by all sink adapters
#[derive(Debug, Default)]
pub struct SinkMetrics {
    /// Blocks committed to the destination
    pub blocks_completed: AtomicU64,

    /// Rows committed to the destination
    pub rows_written: AtomicU64,

    /// Bytes committed to the destination
    pub bytes_written: AtomicU64,

    /// Blocks handed back for replay
    pub block_restarts: AtomicU64,

    /// Write errors encountered
    pub write_errors: AtomicU64,

    /// Output units closed by rollover
    pub units_rolled: AtomicU64,

    /// Output units removed by pruning
    pub units_pruned: AtomicU64,
}

impl SinkMetrics {
    /// Create new metrics instance
    pub const fn new() -> Self {
        Self {
            blocks_completed: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            block_restarts: AtomicU64::new(0),
            write_errors: AtomicU64::new(0),
            units_rolled: AtomicU64::new(0),
            units_pruned: AtomicU64::new(0),
        }
    }

    /// Record a committed block
    #[inline]
    pub fn block_completed(&self, rows: u64, bytes: u64) {
        self.blocks_completed.fetch_add(1, Ordering::Relaxed);
        self.rows_written.fetch_add(rows, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a block sent back for replay
    #[inline]
    pub fn block_restarted(&self) {
        self.block_restarts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn write_error(&self) {
        self.write_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn unit_rolled(&self) {
        self.units_rolled.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn units_pruned(&self, count: u64) {
        self.units_pruned.fetch_add(count, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_completed: self.blocks_completed.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            block_restarts: self.block_restarts.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
            units_rolled: self.units_rolled.load(Ordering::Relaxed),
            units_pruned: self.units_pruned.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of sink metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub blocks_completed: u64,
    pub rows_written: u64,
    pub bytes_written: u64,
    pub block_restarts: u64,
    pub write_errors: u64,
    pub units_rolled: u64,
    pub units_pruned: u64,
}

/// Common sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    /// Sink initialization failed
    #[error("failed to initialize sink: {0}")]
    Init(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SinkError {
    /// Create an initialization error
    pub fn init(msg: impl Into<String>) -> Self {
        Self::Init(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for sink operations
pub type Result<T> = std::result::Result<T, SinkError>;

#[cfg(test)]
#[path = "common_test.rs"]
mod common_test;
