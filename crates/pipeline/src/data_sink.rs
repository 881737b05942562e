//! Export data sink
//!
//! One `ExportDataSink` per advertised (partition, table signature). It
//! owns the ack watermark of its stream and a queue pair per named engine
//! connection, and drives the decoder as POLL_RESPONSEs arrive.
//!
//! # Poll/ack cycle (per connection)
//!
//! ```text
//!            work(): POLL(watermark)
//!   Idle ─────────────────────────────▶ AwaitingPollResponse
//!    ▲                                         │
//!    │  POLL_RESPONSE(A, D)                    │
//!    │    D non-empty: decode, replay block,   │
//!    │                 watermark = A + |D|     │
//!    │    D empty (stall): watermark = A       │
//!    └─────────────────────────────────────────┘
//!            then POLL(watermark) immediately
//! ```
//!
//! At most one POLL is outstanding per connection. The watermark never
//! decreases and survives connection loss; a re-attached connection first
//! sends ACK(watermark), then polls from it.
//!
//! A block that ends at or below the watermark was already delivered
//! through another connection and is not handed to the decoder again. A
//! block that starts below the watermark but ends above it is delivered
//! whole, since a block is the unit of replay.
//!
//! A decode error or protocol violation detaches the connection it arrived
//! on and cancels that connection's fault token, so the session serving it
//! can tear down and reconnect from the watermark.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use export_protocol::{
    AdvertisedDataSource, BlockDecoder, CodecOptions, DecodeFlags, ExportProtoMessage, MessageKind,
    NO_ACK, Payload, ProtocolError, StreamKey,
};

use crate::backoff::BackoffPolicy;
use crate::decoder::ExportDecoder;
use crate::error::{PipelineError, Result};
use crate::metrics::ExportMetrics;
use crate::replay::{BlockOutcome, replay_block};

/// Poll state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// No poll outstanding
    Idle,
    AwaitingPollResponse,
}

/// Queue pair and poll state for one named connection
#[derive(Debug)]
struct ConnectionQueues {
    outbound: mpsc::Sender<ExportProtoMessage>,
    inbound: mpsc::Receiver<ExportProtoMessage>,
    state: PollState,
    /// Ack offset carried by the outstanding poll
    polled_at: i64,
    /// ACK(watermark) still to be sent on this connection
    ack_pending: bool,
    /// Engine answered ERROR; no poll before this instant
    suspended_until: Option<Instant>,
    /// Cancelled when this sink gives up on the connection
    fault: CancellationToken,
}

/// Decode and replay settings for a data sink
#[derive(Debug, Clone, Copy, Default)]
pub struct SinkSettings {
    pub codec: CodecOptions,
    pub flags: DecodeFlags,
    pub replay: BackoffPolicy,
}

/// Per-stream poll/ack state machine
pub struct ExportDataSink {
    source: AdvertisedDataSource,
    key: StreamKey,
    decoder: Option<Box<dyn ExportDecoder>>,
    blocks: BlockDecoder,
    replay: BackoffPolicy,
    ack_watermark: i64,
    connections: BTreeMap<String, ConnectionQueues>,
    retired: bool,
    metrics: Arc<ExportMetrics>,
}

impl ExportDataSink {
    pub fn new(
        source: AdvertisedDataSource,
        decoder: Box<dyn ExportDecoder>,
        settings: SinkSettings,
        metrics: Arc<ExportMetrics>,
    ) -> Self {
        let blocks = BlockDecoder::new(
            source.partition_id,
            source.format_version,
            settings.flags,
            settings.codec,
        );
        Self {
            key: source.stream_key(),
            source,
            decoder: Some(decoder),
            blocks,
            replay: settings.replay,
            ack_watermark: NO_ACK,
            connections: BTreeMap::new(),
            retired: false,
            metrics,
        }
    }

    #[inline]
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    #[inline]
    pub fn source(&self) -> &AdvertisedDataSource {
        &self.source
    }

    /// Highest acknowledged offset, [`NO_ACK`] before the first ack
    #[inline]
    pub fn ack_watermark(&self) -> i64 {
        self.ack_watermark
    }

    #[inline]
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Poll state of a connection, `None` if not attached
    pub fn connection_state(&self, connection: &str) -> Option<PollState> {
        self.connections.get(connection).map(|q| q.state)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Attach the queue pair of a (re)connected engine connection
    ///
    /// Replaces any queues previously attached under the same name. `fault`
    /// is cancelled if the sink later rejects a message from this
    /// connection.
    pub fn attach_connection(
        &mut self,
        connection: impl Into<String>,
        outbound: mpsc::Sender<ExportProtoMessage>,
        inbound: mpsc::Receiver<ExportProtoMessage>,
        fault: CancellationToken,
    ) {
        if self.retired {
            return;
        }
        let connection = connection.into();
        debug!(
            stream = %self.key,
            connection = %connection,
            ack_offset = self.ack_watermark,
            "connection attached"
        );
        self.connections.insert(
            connection,
            ConnectionQueues {
                outbound,
                inbound,
                state: PollState::Idle,
                polled_at: NO_ACK,
                ack_pending: self.ack_watermark != NO_ACK,
                suspended_until: None,
                fault,
            },
        );
    }

    /// Forget a connection; the watermark is kept
    pub fn connection_lost(&mut self, connection: &str) {
        if let Some(queues) = self.connections.remove(connection) {
            debug!(
                stream = %self.key,
                connection,
                awaiting = queues.state == PollState::AwaitingPollResponse,
                ack_offset = self.ack_watermark,
                "connection detached"
            );
        }
    }

    /// Detach a connection whose messages this sink rejected
    fn connection_failed(&mut self, connection: &str) {
        if let Some(queues) = self.connections.get(connection) {
            queues.fault.cancel();
        }
        self.connection_lost(connection);
    }

    /// Retire the stream
    ///
    /// The decoder is told once and dropped; later calls and later
    /// `work()` ticks do nothing.
    pub fn source_no_longer_advertised(&mut self) {
        if self.retired {
            return;
        }
        self.retired = true;
        self.connections.clear();
        if let Some(mut decoder) = self.decoder.take() {
            decoder.source_no_longer_advertised(&self.source);
        }
        info!(
            stream = %self.key,
            table = %self.source.table_name,
            ack_offset = self.ack_watermark,
            "source no longer advertised"
        );
    }

    /// Drain inbound messages, then poll on every idle connection
    ///
    /// A decode error or protocol violation detaches the connection it
    /// arrived on and is returned; other connections are unaffected.
    pub async fn work(&mut self, cancel: &CancellationToken) -> Result<()> {
        if self.retired {
            return Ok(());
        }

        let names: Vec<String> = self.connections.keys().cloned().collect();
        for name in &names {
            while let Some(msg) = self.next_inbound(name) {
                if let Err(e) = self.handle_message(name, msg, cancel).await {
                    self.connection_failed(name);
                    return Err(e);
                }
                if self.retired {
                    return Ok(());
                }
            }
        }

        for name in &names {
            self.issue_poll(name, cancel)?;
        }
        Ok(())
    }

    fn next_inbound(&mut self, connection: &str) -> Option<ExportProtoMessage> {
        let queues = self.connections.get_mut(connection)?;
        match queues.inbound.try_recv() {
            Ok(msg) => Some(msg),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.connection_lost(connection);
                None
            }
        }
    }

    async fn handle_message(
        &mut self,
        connection: &str,
        msg: ExportProtoMessage,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let payload = msg.into_payload().ok_or(ProtocolError::MissingPayload)?;
        match payload {
            Payload::PollResponse { ack_offset, data } => {
                self.on_poll_response(connection, ack_offset, data, cancel)
                    .await?;
                self.issue_poll(connection, cancel)
            }
            Payload::Error(message) => {
                // Typically a replica that does not own the partition
                warn!(
                    stream = %self.key,
                    connection,
                    error = %message,
                    "engine rejected poll"
                );
                if let Some(queues) = self.connections.get_mut(connection) {
                    queues.state = PollState::Idle;
                    queues.suspended_until = Some(Instant::now() + self.replay.initial);
                }
                Ok(())
            }
            Payload::Close => {
                self.source_no_longer_advertised();
                Ok(())
            }
            other => {
                self.metrics.record_protocol_violation();
                error!(
                    stream = %self.key,
                    connection,
                    kind = %other.kind(),
                    "unexpected message for data sink"
                );
                Err(PipelineError::UnexpectedMessage {
                    stream: self.key.clone(),
                    connection: connection.to_string(),
                    kind: other.kind(),
                })
            }
        }
    }

    async fn on_poll_response(
        &mut self,
        connection: &str,
        ack_offset: i64,
        data: Bytes,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some(queues) = self.connections.get_mut(connection) else {
            return Ok(());
        };

        if queues.state != PollState::AwaitingPollResponse {
            self.metrics.record_protocol_violation();
            error!(stream = %self.key, connection, "POLL_RESPONSE without outstanding POLL");
            return Err(PipelineError::UnexpectedMessage {
                stream: self.key.clone(),
                connection: connection.to_string(),
                kind: MessageKind::PollResponse,
            });
        }
        if queues.polled_at != NO_ACK && ack_offset < queues.polled_at {
            self.metrics.record_protocol_violation();
            error!(
                stream = %self.key,
                connection,
                previous = queues.polled_at,
                received = ack_offset,
                "ack offset regressed"
            );
            return Err(PipelineError::AckRegression {
                stream: self.key.clone(),
                connection: connection.to_string(),
                previous: queues.polled_at,
                received: ack_offset,
            });
        }
        queues.state = PollState::Idle;

        if data.is_empty() {
            self.metrics.record_stall();
            self.ack_watermark = self.ack_watermark.max(ack_offset);
            trace!(stream = %self.key, connection, ack_offset, "stall");
            return Ok(());
        }

        let rows = match self.blocks.decode(data.clone()) {
            Ok(rows) => rows,
            Err(source) => {
                self.metrics.record_decode_error();
                error!(
                    stream = %self.key,
                    connection,
                    ack_offset,
                    error = %source,
                    "failed to decode data block"
                );
                return Err(PipelineError::Decode {
                    stream: self.key.clone(),
                    source,
                });
            }
        };

        // Decoded anyway: the block may carry a schema later blocks reuse
        let end = ack_offset.saturating_add(data.len() as i64);
        if end <= self.ack_watermark {
            self.metrics.record_block_skipped();
            debug!(
                stream = %self.key,
                connection,
                ack_offset,
                watermark = self.ack_watermark,
                "block already acknowledged, skipped"
            );
            return Ok(());
        }

        let outcome = match self.decoder.as_deref_mut() {
            Some(decoder) => replay_block(decoder, &rows, &self.replay, cancel).await,
            None => BlockOutcome::Abandoned { attempts: 0 },
        };

        match outcome {
            BlockOutcome::Completed { attempts } => {
                self.ack_watermark = self.ack_watermark.max(end);
                self.metrics.record_block_acked(
                    rows.len() as u64,
                    data.len() as u64,
                    u64::from(attempts.saturating_sub(1)),
                );
                debug!(
                    stream = %self.key,
                    connection,
                    rows = rows.len(),
                    attempts,
                    ack_offset = self.ack_watermark,
                    "block acknowledged"
                );
            }
            BlockOutcome::Abandoned { attempts } => {
                self.metrics
                    .record_block_abandoned(u64::from(attempts.saturating_sub(1)));
                info!(
                    stream = %self.key,
                    connection,
                    ack_offset = self.ack_watermark,
                    attempts,
                    "block abandoned without ack"
                );
            }
        }
        Ok(())
    }

    fn message(&self) -> ExportProtoMessage {
        ExportProtoMessage::new(
            self.source.generation,
            self.source.partition_id,
            self.source.signature.clone(),
        )
    }

    /// Send the pending ACK and a POLL on `connection` if it is idle
    ///
    /// A full outbound queue leaves the connection idle for the next tick.
    fn issue_poll(&mut self, connection: &str, cancel: &CancellationToken) -> Result<()> {
        if self.retired || cancel.is_cancelled() {
            return Ok(());
        }
        let watermark = self.ack_watermark;
        let ack = self.message().ack(watermark)?;
        let poll = self.message().poll(watermark)?;

        let Some(queues) = self.connections.get_mut(connection) else {
            return Ok(());
        };

        let mut closed = false;
        if queues.ack_pending {
            match queues.outbound.try_send(ack) {
                Ok(()) => queues.ack_pending = false,
                Err(TrySendError::Full(_)) => return Ok(()),
                Err(TrySendError::Closed(_)) => closed = true,
            }
        }

        let suspended = queues
            .suspended_until
            .is_some_and(|until| Instant::now() < until);
        if !closed && !suspended && queues.state == PollState::Idle {
            match queues.outbound.try_send(poll) {
                Ok(()) => {
                    queues.state = PollState::AwaitingPollResponse;
                    queues.suspended_until = None;
                    queues.polled_at = watermark;
                    trace!(stream = %self.key, connection, ack_offset = watermark, "poll");
                }
                Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Closed(_)) => closed = true,
            }
        }

        if closed {
            self.connection_lost(connection);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ExportDataSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportDataSink")
            .field("key", &self.key)
            .field("ack_watermark", &self.ack_watermark)
            .field("connections", &self.connections.len())
            .field("retired", &self.retired)
            .finish()
    }
}
