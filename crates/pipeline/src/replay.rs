//! Block bracket execution and replay
//!
//! `run_block` drives one attempt of the decoder bracket; `replay_block`
//! repeats attempts until one succeeds or the stream is cancelled.
//!
//! Decoders do blocking I/O inside the bracket. On a multi-threaded runtime
//! each attempt runs under `block_in_place`, so other sinks scheduled on the
//! same worker keep running.

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use export_protocol::ExportRow;

use crate::backoff::BackoffPolicy;
use crate::decoder::{ExportDecoder, RestartBlock};

/// How a replayed block ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Block fully consumed; safe to ack
    Completed { attempts: u32 },
    /// Cancelled before an attempt succeeded; must not be acked
    Abandoned { attempts: u32 },
}

impl BlockOutcome {
    #[inline]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Run one attempt of the decoder bracket over `rows`
///
/// Once `on_block_start` succeeds, `on_block_completion` is called exactly
/// once, also after an early stop or a restart from `process_row`. When
/// both `process_row` and completion ask for a restart, the first reason
/// wins and backoff is requested if either asked for it. An empty block
/// opens no bracket.
pub fn run_block(decoder: &mut dyn ExportDecoder, rows: &[ExportRow]) -> Result<(), RestartBlock> {
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return Ok(());
    };

    decoder.on_block_start(first)?;

    let mut processed = Ok(());
    for row in rows {
        match decoder.process_row(row) {
            Ok(true) => {}
            Ok(false) => break,
            Err(restart) => {
                processed = Err(restart);
                break;
            }
        }
    }

    let completed = decoder.on_block_completion(last);
    match (processed, completed) {
        (Ok(()), completed) => completed,
        (Err(restart), Ok(())) => Err(restart),
        (Err(mut restart), Err(late)) => {
            restart.request_backoff |= late.request_backoff;
            Err(restart)
        }
    }
}

fn run_block_in_place(
    decoder: &mut dyn ExportDecoder,
    rows: &[ExportRow],
) -> Result<(), RestartBlock> {
    let multi_thread = Handle::try_current()
        .is_ok_and(|handle| handle.runtime_flavor() == RuntimeFlavor::MultiThread);
    if multi_thread {
        tokio::task::block_in_place(|| run_block(decoder, rows))
    } else {
        run_block(decoder, rows)
    }
}

/// Run the bracket until an attempt succeeds
///
/// Restarts that request backoff wait `policy.delay(n)` for the n-th such
/// restart of this block; other restarts replay immediately. Cancellation
/// abandons the block.
pub async fn replay_block(
    decoder: &mut dyn ExportDecoder,
    rows: &[ExportRow],
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
) -> BlockOutcome {
    let mut attempts = 0u32;
    let mut backoffs = 0u32;

    loop {
        if cancel.is_cancelled() {
            return BlockOutcome::Abandoned { attempts };
        }
        attempts += 1;

        let restart = match run_block_in_place(decoder, rows) {
            Ok(()) => return BlockOutcome::Completed { attempts },
            Err(restart) => restart,
        };

        let table = rows.first().map(|r| r.table_name()).unwrap_or_default();
        if restart.request_backoff {
            let delay = policy.delay(backoffs);
            backoffs = backoffs.saturating_add(1);
            warn!(
                table,
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                reason = %restart.reason,
                "block restart requested, backing off"
            );
            tokio::select! {
                _ = cancel.cancelled() => return BlockOutcome::Abandoned { attempts },
                _ = tokio::time::sleep(delay) => {}
            }
        } else {
            debug!(
                table,
                attempt = attempts,
                reason = %restart.reason,
                "block restart requested, replaying immediately"
            );
            tokio::task::yield_now().await;
        }
    }
}
