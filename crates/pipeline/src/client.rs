//! Export client
//!
//! One task per configured server keeps a connection alive: connect,
//! authenticate, OPEN, then route inbound messages to the data sinks by
//! (partition, signature). Sinks are shared across connections through the
//! [`SinkRegistry`], so a stream served by several servers keeps a single
//! ack watermark.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use export_protocol::{ExportProtoMessage, StreamKey};

use crate::backoff::BackoffPolicy;
use crate::connection::{Credentials, EngineConnection, read_message, write_message};
use crate::data_sink::SinkSettings;
use crate::decoder::DecoderFactory;
use crate::error::{PipelineError, Result};
use crate::metrics::ExportMetrics;
use crate::registry::SinkRegistry;
use crate::sink_handle::SinkHandle;
use crate::DEFAULT_QUEUE_SIZE;

/// Client connection and polling options
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Engine servers as `host:port`
    pub servers: Vec<String>,
    pub credentials: Credentials,
    pub connect_timeout: Duration,
    /// Delay between reconnect attempts
    pub reconnect: BackoffPolicy,
    /// Upper bound between two `work()` ticks of a sink
    pub poll_interval: Duration,
    /// Capacity of per-connection message queues
    pub queue_size: usize,
    pub sink: SinkSettings,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            servers: Vec::new(),
            credentials: Credentials::default(),
            connect_timeout: Duration::from_secs(5),
            reconnect: BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30), 2),
            poll_interval: Duration::from_millis(10),
            queue_size: DEFAULT_QUEUE_SIZE,
            sink: SinkSettings::default(),
        }
    }
}

/// Export client
///
/// # Example
///
/// ```ignore
/// let client = ExportClient::new(options, Arc::new(factory));
/// let cancel = CancellationToken::new();
/// client.run(cancel.clone()).await?;
/// ```
pub struct ExportClient {
    options: ClientOptions,
    registry: Arc<SinkRegistry>,
    metrics: Arc<ExportMetrics>,
}

impl ExportClient {
    pub fn new(options: ClientOptions, factory: Arc<dyn DecoderFactory>) -> Self {
        let metrics = Arc::new(ExportMetrics::new());
        let registry = Arc::new(SinkRegistry::new(
            factory,
            options.sink,
            options.poll_interval,
            Arc::clone(&metrics),
        ));
        Self {
            options,
            registry,
            metrics,
        }
    }

    #[inline]
    pub fn metrics(&self) -> Arc<ExportMetrics> {
        Arc::clone(&self.metrics)
    }

    #[inline]
    pub fn registry(&self) -> &Arc<SinkRegistry> {
        &self.registry
    }

    /// Run until `cancel` fires or a server rejects the credentials
    ///
    /// All data sinks are stopped before returning.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let mut servers = JoinSet::new();
        for server in &self.options.servers {
            servers.spawn(maintain_connection(
                server.clone(),
                self.options.clone(),
                Arc::clone(&self.registry),
                Arc::clone(&self.metrics),
                cancel.clone(),
            ));
        }

        let mut result = Ok(());
        while let Some(joined) = servers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(error = %e, "export connection stopped");
                    if result.is_ok() {
                        result = Err(e);
                    }
                    cancel.cancel();
                }
                Err(e) => {
                    error!(error = %e, "export connection task failed");
                    cancel.cancel();
                }
            }
        }

        self.registry.shutdown().await;
        info!("export client stopped");
        result
    }
}

/// Connect, serve and reconnect one server until cancelled
async fn maintain_connection(
    server: String,
    options: ClientOptions,
    registry: Arc<SinkRegistry>,
    metrics: Arc<ExportMetrics>,
    cancel: CancellationToken,
) -> Result<()> {
    let mut attempt = 0u32;

    loop {
        let connected = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            connected = EngineConnection::connect(&server, &options.credentials, options.connect_timeout) => connected,
        };

        match connected {
            Ok(connection) => {
                attempt = 0;
                metrics.record_connection_opened();
                info!(connection = %server, "connected to engine");

                match run_session(connection, &registry, &options, &cancel).await {
                    Ok(()) => return Ok(()),
                    Err(e) if e.is_retryable() => {
                        metrics.record_connection_lost();
                        warn!(connection = %server, error = %e, "engine connection lost");
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(e) if e.is_retryable() => {
                warn!(connection = %server, attempt, error = %e, "failed to connect to engine");
            }
            Err(e) => return Err(e),
        }

        let delay = options.reconnect.delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(connection = %server, delay = ?delay, "reconnecting");

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Where inbound messages for one stream go
struct Route {
    inbound: mpsc::Sender<ExportProtoMessage>,
    handle: SinkHandle,
}

/// Serve one authenticated connection
///
/// Returns `Ok(())` only when cancelled; losing the connection is an error.
async fn run_session(
    mut connection: EngineConnection,
    registry: &SinkRegistry,
    options: &ClientOptions,
    cancel: &CancellationToken,
) -> Result<()> {
    let advertised = connection.open().await?;
    let (name, mut reader, mut writer) = connection.into_parts();

    info!(
        connection = %name,
        sources = advertised.sources.len(),
        hosts = ?advertised.hosts,
        "export sources advertised"
    );

    let session = cancel.child_token();
    // Cancelled by any data sink that rejects a message from this engine
    let faulted = CancellationToken::new();
    let (outbound, mut outbound_rx) = mpsc::channel::<ExportProtoMessage>(options.queue_size);

    let writer_token = session.clone();
    let mut writer_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_token.cancelled() => return Ok(()),
                message = outbound_rx.recv() => match message {
                    Some(message) => write_message(&mut writer, &message).await?,
                    None => return Ok(()),
                },
            }
        }
    });

    let mut routes: HashMap<StreamKey, Route> = HashMap::with_capacity(advertised.sources.len());
    for source in &advertised.sources {
        let handle = registry.ensure(source);
        let (inbound, inbound_rx) = mpsc::channel(options.queue_size);
        if handle
            .attach(name.clone(), outbound.clone(), inbound_rx, faulted.clone())
            .await
            .is_err()
        {
            debug!(connection = %name, stream = %source.stream_key(), "data sink stopped before attach");
            continue;
        }
        routes.insert(source.stream_key(), Route { inbound, handle });
    }

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => break Ok(()),
            _ = faulted.cancelled() => {
                break Err(PipelineError::connection_lost(&name, "data sink rejected engine message"));
            }
            joined = &mut writer_task => {
                break Err(match joined {
                    Ok(Ok(())) => PipelineError::connection_lost(&name, "writer stopped"),
                    Ok(Err(e)) => e,
                    Err(e) => PipelineError::connection_lost(&name, e.to_string()),
                });
            }
            message = read_message(&mut reader) => match message {
                Ok(Some(message)) => route_message(&name, &mut routes, message).await,
                Ok(None) => break Err(PipelineError::connection_lost(&name, "closed by engine")),
                Err(e) => break Err(e),
            },
        }
    };

    session.cancel();
    for route in routes.values() {
        route.handle.detach(name.clone()).await;
    }
    drop(outbound);

    result
}

/// Deliver an inbound message to its stream's sink
async fn route_message(
    connection: &str,
    routes: &mut HashMap<StreamKey, Route>,
    message: ExportProtoMessage,
) {
    let key = StreamKey::new(message.partition_id(), message.signature());

    let Some(route) = routes.get(&key) else {
        if let Some(reason) = message.error_message() {
            warn!(connection, stream = %key, reason, "engine reported error for unknown stream");
        } else {
            debug!(connection, stream = %key, kind = ?message.kind(), "message for unknown stream dropped");
        }
        return;
    };

    if route.inbound.send(message).await.is_ok() {
        route.handle.wake();
    } else {
        debug!(connection, stream = %key, "data sink gone, dropping route");
        routes.remove(&key);
    }
}
