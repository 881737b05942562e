//! Run command - connect to the engine and export
//!
//! Wires the configuration into an [`ExportClient`] and a sink adapter,
//! keeps the sink's rollover going, and shuts everything down on Ctrl+C
//! or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use export_config::Config;
use export_pipeline::{
    BackoffPolicy, ClientOptions, Credentials, DecoderFactory, ExportClient, SinkSettings,
};
use export_protocol::{CodecOptions, DecodeFlags};
use export_sinks::ExportSink;

/// How often the sink checks for units to roll
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(1);

/// Reconnect delay growth factor
const RECONNECT_MULTIPLIER: u32 = 2;

/// Run the export client until shutdown
pub async fn run(config: Config) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        servers = ?config.client.servers,
        sink = ?config.sink.sink_type,
        "export client starting"
    );

    let sink = Arc::new(
        ExportSink::from_config(&config.sink, &config.codec).context("failed to open sink")?,
    );
    let client = ExportClient::new(
        client_options(&config),
        Arc::clone(&sink) as Arc<dyn DecoderFactory>,
    );

    let cancel = CancellationToken::new();
    let maintenance = tokio::spawn(maintain_sink(Arc::clone(&sink), cancel.clone()));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("shutdown requested");
        shutdown.cancel();
    });

    let result = client.run(cancel.clone()).await;
    cancel.cancel();
    if let Err(e) = maintenance.await {
        warn!(error = %e, "sink maintenance task failed");
    }
    sink.shutdown();

    let metrics = client.metrics().snapshot();
    info!(
        blocks = metrics.blocks_acked,
        rows = metrics.rows_acked,
        bytes = metrics.bytes_acked,
        stalls = metrics.stalls,
        restarts = metrics.block_restarts,
        abandoned = metrics.blocks_abandoned,
        decode_errors = metrics.decode_errors,
        protocol_violations = metrics.protocol_violations,
        connections = metrics.connections_opened,
        "export client shutdown complete"
    );

    result.context("export client failed")
}

/// Translate configuration into client options
pub fn client_options(config: &Config) -> ClientOptions {
    let client = &config.client;
    let replay = &config.replay;

    ClientOptions {
        servers: client.servers.clone(),
        credentials: Credentials {
            service: client.service.clone(),
            username: client.username.clone(),
            password: client.password.clone(),
        },
        connect_timeout: client.connect_timeout,
        reconnect: BackoffPolicy::new(
            client.reconnect_delay,
            client.max_reconnect_delay,
            RECONNECT_MULTIPLIER,
        ),
        poll_interval: client.poll_interval,
        queue_size: client.queue_size,
        sink: SinkSettings {
            codec: CodecOptions {
                decimal_scale: config.codec.decimal_scale,
            },
            flags: DecodeFlags::NONE,
            replay: BackoffPolicy::new(
                replay.initial_backoff,
                replay.max_backoff,
                replay.multiplier,
            ),
        },
    }
}

/// Roll expired output units until cancelled
async fn maintain_sink(sink: Arc<ExportSink>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let rolled = sink.maintain();
                if rolled > 0 {
                    info!(rolled, "rolled output units");
                }
            }
        }
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
