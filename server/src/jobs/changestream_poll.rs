//! Drives the change-stream dispatcher (spec §4.D) on a fixed poll
//! interval: reads the dispatcher's cursor, pulls the next ordered
//! batch of events, hands it to `changestream::process_batch`, and
//! advances the cursor past the batch — at-least-once, never skipping
//! ahead on a failed batch.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use crate::changestream::{self, DispatcherContext};

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;
const BATCH_SIZE: i64 = 100;

fn poll_interval_ms() -> u64 {
    match std::env::var("CHANGESTREAM_POLL_INTERVAL_MS") {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(parsed) if parsed > 0 => parsed,
            _ => {
                warn!(value = %raw, fallback = DEFAULT_POLL_INTERVAL_MS, "invalid CHANGESTREAM_POLL_INTERVAL_MS, using default");
                DEFAULT_POLL_INTERVAL_MS
            }
        },
        Err(_) => DEFAULT_POLL_INTERVAL_MS,
    }
}

pub async fn run_changestream_worker(ctx: Arc<DispatcherContext>) {
    let interval_ms = poll_interval_ms();
    let mut ticker = interval(Duration::from_millis(interval_ms));
    info!(interval_ms, "starting change-stream dispatcher worker");

    loop {
        ticker.tick().await;

        let cursor = match ctx.table.dispatcher_cursor().await {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "failed to read dispatcher cursor");
                continue;
            }
        };

        let events = match ctx.table.poll_events(cursor, BATCH_SIZE).await {
            Ok(events) => events,
            Err(e) => {
                error!(error = %e, "failed to poll change-stream events");
                continue;
            }
        };
        if events.is_empty() {
            continue;
        }

        let last_seq = events.last().map(|e| e.seq).unwrap_or(cursor);
        if let Err(e) = changestream::process_batch(&ctx, &events).await {
            error!(error = %e, "change-stream batch processing failed");
            continue;
        }

        if let Err(e) = ctx.table.advance_dispatcher_cursor(last_seq).await {
            error!(error = %e, seq = last_seq, "failed to advance dispatcher cursor");
        }
    }
}
