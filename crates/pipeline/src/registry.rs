//! Data sink registry
//!
//! Sinks are keyed by (partition, signature) in a concurrent map shared by
//! every engine connection. Each sink runs in its own task; the registry
//! owns the tasks and stops them on shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use export_protocol::{AdvertisedDataSource, StreamKey};

use crate::data_sink::{ExportDataSink, SinkSettings};
use crate::decoder::DecoderFactory;
use crate::metrics::ExportMetrics;
use crate::sink_handle::{SinkCommand, SinkHandle};

/// Capacity of a sink's command channel
const COMMAND_CHANNEL_SIZE: usize = 16;

struct RegisteredSink {
    handle: SinkHandle,
    task: JoinHandle<()>,
}

/// Registry of running data sinks
pub struct SinkRegistry {
    sinks: Arc<DashMap<StreamKey, RegisteredSink>>,
    factory: Arc<dyn DecoderFactory>,
    settings: SinkSettings,
    poll_interval: Duration,
    metrics: Arc<ExportMetrics>,
    cancel: CancellationToken,
    next_id: AtomicU64,
}

impl SinkRegistry {
    pub fn new(
        factory: Arc<dyn DecoderFactory>,
        settings: SinkSettings,
        poll_interval: Duration,
        metrics: Arc<ExportMetrics>,
    ) -> Self {
        Self {
            sinks: Arc::new(DashMap::new()),
            factory,
            settings,
            poll_interval,
            metrics,
            cancel: CancellationToken::new(),
            next_id: AtomicU64::new(0),
        }
    }

    /// Handle to the sink for `source`, starting it if needed
    ///
    /// Must be called from within a tokio runtime.
    pub fn ensure(&self, source: &AdvertisedDataSource) -> SinkHandle {
        match self.sinks.entry(source.stream_key()) {
            Entry::Occupied(entry) => entry.get().handle.clone(),
            Entry::Vacant(entry) => {
                let registered = self.start(source);
                let handle = registered.handle.clone();
                entry.insert(registered);
                handle
            }
        }
    }

    pub fn get(&self, key: &StreamKey) -> Option<SinkHandle> {
        self.sinks.get(key).map(|s| s.handle.clone())
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Stop every sink and wait for its task
    ///
    /// Blocks in flight are abandoned without ack.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let keys: Vec<StreamKey> = self.sinks.iter().map(|s| s.key().clone()).collect();
        for key in keys {
            if let Some((_, sink)) = self.sinks.remove(&key)
                && let Err(e) = sink.task.await
            {
                warn!(stream = %key, error = %e, "data sink task failed");
            }
        }
    }

    fn start(&self, source: &AdvertisedDataSource) -> RegisteredSink {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let decoder = self.factory.construct_export_decoder(source);
        let sink = ExportDataSink::new(
            source.clone(),
            decoder,
            self.settings,
            Arc::clone(&self.metrics),
        );

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let notify = Arc::new(Notify::new());
        let handle = SinkHandle::new(id, source.stream_key(), commands_tx, Arc::clone(&notify));

        let driver = SinkDriver {
            id,
            sink,
            commands: commands_rx,
            notify,
            poll_interval: self.poll_interval,
            cancel: self.cancel.child_token(),
            sinks: Arc::clone(&self.sinks),
        };
        let task = tokio::spawn(driver.run());

        RegisteredSink { handle, task }
    }
}

/// Task state of one data sink
struct SinkDriver {
    id: u64,
    sink: ExportDataSink,
    commands: mpsc::Receiver<SinkCommand>,
    notify: Arc<Notify>,
    poll_interval: Duration,
    cancel: CancellationToken,
    sinks: Arc<DashMap<StreamKey, RegisteredSink>>,
}

impl SinkDriver {
    /// Tick `work()` on commands, inbound wake-ups and the poll interval
    async fn run(mut self) {
        let key = self.sink.key().clone();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            stream = %key,
            table = %self.sink.source().table_name,
            generation = self.sink.source().generation,
            "data sink started"
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                cmd = self.commands.recv() => match cmd {
                    Some(SinkCommand::Attach { connection, outbound, inbound, fault }) => {
                        self.sink.attach_connection(connection, outbound, inbound, fault);
                    }
                    Some(SinkCommand::Detach { connection }) => {
                        self.sink.connection_lost(&connection);
                    }
                    Some(SinkCommand::Retire) => self.sink.source_no_longer_advertised(),
                    None => break,
                },
                _ = self.notify.notified() => {}
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.sink.work(&self.cancel).await {
                warn!(stream = %key, error = %e, "data sink dropped connection");
            }
            if self.sink.is_retired() {
                break;
            }
        }

        let id = self.id;
        self.sinks.remove_if(&key, |_, s| s.handle.id() == id);
        debug!(
            stream = %key,
            ack_offset = self.sink.ack_watermark(),
            "data sink stopped"
        );
    }
}
