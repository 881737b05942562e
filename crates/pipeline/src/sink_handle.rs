//! Handle to a running data sink
//!
//! `SinkHandle` wraps the command channel and wake-up signal of one data
//! sink task, allowing connections to attach and feed it without owning
//! the sink itself.

use std::sync::Arc;

use tokio::sync::{Notify, mpsc};
use tokio_util::sync::CancellationToken;

use export_protocol::{ExportProtoMessage, StreamKey};

use crate::error::{PipelineError, Result};

/// Commands accepted by a data sink task
#[derive(Debug)]
pub enum SinkCommand {
    /// A connection came up; start polling on it
    Attach {
        connection: String,
        outbound: mpsc::Sender<ExportProtoMessage>,
        inbound: mpsc::Receiver<ExportProtoMessage>,
        /// Cancelled when the sink rejects a message from the connection
        fault: CancellationToken,
    },
    /// A connection went away
    Detach { connection: String },
    /// The engine retired the stream
    Retire,
}

/// Handle to a data sink task
///
/// Cheap to clone; every connection serving the stream holds one.
///
/// # Example
///
/// ```ignore
/// let handle = registry.ensure(&source);
/// let (in_tx, in_rx) = mpsc::channel(1024);
/// handle.attach("db1:21212", outbound.clone(), in_rx, fault.clone()).await?;
///
/// in_tx.send(message).await?;
/// handle.wake();
/// ```
#[derive(Debug, Clone)]
pub struct SinkHandle {
    /// Distinguishes sinks registered under the same key over time
    id: u64,

    key: StreamKey,

    commands: mpsc::Sender<SinkCommand>,

    /// Signalled when inbound messages are queued
    notify: Arc<Notify>,
}

impl SinkHandle {
    #[inline]
    pub fn new(
        id: u64,
        key: StreamKey,
        commands: mpsc::Sender<SinkCommand>,
        notify: Arc<Notify>,
    ) -> Self {
        Self {
            id,
            key,
            commands,
            notify,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Attach a connection's queue pair
    ///
    /// Returns `Err` if the sink task has stopped.
    pub async fn attach(
        &self,
        connection: impl Into<String>,
        outbound: mpsc::Sender<ExportProtoMessage>,
        inbound: mpsc::Receiver<ExportProtoMessage>,
        fault: CancellationToken,
    ) -> Result<()> {
        self.commands
            .send(SinkCommand::Attach {
                connection: connection.into(),
                outbound,
                inbound,
                fault,
            })
            .await
            .map_err(|_| PipelineError::ShuttingDown)
    }

    /// Detach a connection; a stopped sink is ignored
    pub async fn detach(&self, connection: impl Into<String>) {
        let _ = self
            .commands
            .send(SinkCommand::Detach {
                connection: connection.into(),
            })
            .await;
    }

    /// Retire the stream; a stopped sink is ignored
    pub async fn retire(&self) {
        let _ = self.commands.send(SinkCommand::Retire).await;
    }

    /// Wake the sink to drain its inbound queues
    #[inline]
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Check if the sink task has stopped
    #[inline]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}
