//! Export stream metrics
//!
//! Atomic counters shared by every data sink and connection of a client.
//! All operations use relaxed ordering; values are eventually consistent.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the poll/ack cycle
///
/// # Thread Safety
///
/// All methods are safe to call from multiple threads concurrently.
#[derive(Debug, Default)]
pub struct ExportMetrics {
    /// Non-empty blocks decoded and acknowledged
    blocks_acked: AtomicU64,

    /// Rows handed to decoders in acknowledged blocks
    rows_acked: AtomicU64,

    /// Data block bytes covered by acks
    bytes_acked: AtomicU64,

    /// Empty POLL_RESPONSEs
    stalls: AtomicU64,

    /// Block replays requested by decoders
    block_restarts: AtomicU64,

    /// Blocks given up on cancellation, never acked
    blocks_abandoned: AtomicU64,

    /// Blocks ending at or below the watermark, not delivered again
    blocks_skipped: AtomicU64,

    /// Blocks rejected by the codec
    decode_errors: AtomicU64,

    /// Ack regressions, unexpected messages
    protocol_violations: AtomicU64,

    /// Successful connect + handshake
    connections_opened: AtomicU64,

    /// Connections that ended without shutdown
    connections_lost: AtomicU64,
}

impl ExportMetrics {
    /// Create new metrics instance with all counters at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            blocks_acked: AtomicU64::new(0),
            rows_acked: AtomicU64::new(0),
            bytes_acked: AtomicU64::new(0),
            stalls: AtomicU64::new(0),
            block_restarts: AtomicU64::new(0),
            blocks_abandoned: AtomicU64::new(0),
            blocks_skipped: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            protocol_violations: AtomicU64::new(0),
            connections_opened: AtomicU64::new(0),
            connections_lost: AtomicU64::new(0),
        }
    }

    /// Record an acknowledged block
    #[inline]
    pub fn record_block_acked(&self, rows: u64, bytes: u64, restarts: u64) {
        self.blocks_acked.fetch_add(1, Ordering::Relaxed);
        self.rows_acked.fetch_add(rows, Ordering::Relaxed);
        self.bytes_acked.fetch_add(bytes, Ordering::Relaxed);
        self.block_restarts.fetch_add(restarts, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_stall(&self) {
        self.stalls.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_block_abandoned(&self, restarts: u64) {
        self.blocks_abandoned.fetch_add(1, Ordering::Relaxed);
        self.block_restarts.fetch_add(restarts, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_block_skipped(&self) {
        self.blocks_skipped.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_protocol_violation(&self) {
        self.protocol_violations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_connection_lost(&self) {
        self.connections_lost.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_acked: self.blocks_acked.load(Ordering::Relaxed),
            rows_acked: self.rows_acked.load(Ordering::Relaxed),
            bytes_acked: self.bytes_acked.load(Ordering::Relaxed),
            stalls: self.stalls.load(Ordering::Relaxed),
            block_restarts: self.block_restarts.load(Ordering::Relaxed),
            blocks_abandoned: self.blocks_abandoned.load(Ordering::Relaxed),
            blocks_skipped: self.blocks_skipped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            protocol_violations: self.protocol_violations.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_lost: self.connections_lost.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of export metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub blocks_acked: u64,
    pub rows_acked: u64,
    pub bytes_acked: u64,
    pub stalls: u64,
    pub block_restarts: u64,
    pub blocks_abandoned: u64,
    pub blocks_skipped: u64,
    pub decode_errors: u64,
    pub protocol_violations: u64,
    pub connections_opened: u64,
    pub connections_lost: u64,
}

impl MetricsSnapshot {
    /// Calculate the difference from another snapshot
    pub fn diff(&self, previous: &MetricsSnapshot) -> MetricsSnapshot {
        MetricsSnapshot {
            blocks_acked: self.blocks_acked.saturating_sub(previous.blocks_acked),
            rows_acked: self.rows_acked.saturating_sub(previous.rows_acked),
            bytes_acked: self.bytes_acked.saturating_sub(previous.bytes_acked),
            stalls: self.stalls.saturating_sub(previous.stalls),
            block_restarts: self.block_restarts.saturating_sub(previous.block_restarts),
            blocks_abandoned: self
                .blocks_abandoned
                .saturating_sub(previous.blocks_abandoned),
            blocks_skipped: self.blocks_skipped.saturating_sub(previous.blocks_skipped),
            decode_errors: self.decode_errors.saturating_sub(previous.decode_errors),
            protocol_violations: self
                .protocol_violations
                .saturating_sub(previous.protocol_violations),
            connections_opened: self
                .connections_opened
                .saturating_sub(previous.connections_opened),
            connections_lost: self
                .connections_lost
                .saturating_sub(previous.connections_lost),
        }
    }
}
