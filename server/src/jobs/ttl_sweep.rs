//! Periodic TTL reclamation (spec §9 background jobs), grounded on the
//! teacher's `jobs/delivery_acks_cleanup.rs` interval-loop shape. One
//! sweep reclaims every expired row regardless of kind — `WSConn`,
//! `SubscriptionA`/`B`, `Token`, `Invite`, and `LoginRequest` all carry a
//! TTL — since the store has no full-table scan by kind to clean them
//! individually (spec §4.A is deliberately index-poor, mirroring a
//! partitioned key/value store rather than a relational one).

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use crate::store::Table;
use crate::util::time::now_epoch;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

fn sweep_interval_secs() -> u64 {
    match std::env::var("TTL_SWEEP_INTERVAL_SECS") {
        Ok(raw) => match raw.parse::<u64>() {
            Ok(parsed) if parsed > 0 => parsed,
            _ => {
                warn!(value = %raw, fallback = DEFAULT_SWEEP_INTERVAL_SECS, "invalid TTL_SWEEP_INTERVAL_SECS, using default");
                DEFAULT_SWEEP_INTERVAL_SECS
            }
        },
        Err(_) => DEFAULT_SWEEP_INTERVAL_SECS,
    }
}

/// Runs until the process exits, reclaiming expired rows on a fixed
/// interval.
pub async fn run_ttl_sweep_worker(table: Arc<dyn Table>) {
    let interval_secs = sweep_interval_secs();
    let mut ticker = interval(Duration::from_secs(interval_secs));
    info!(interval_secs, "starting TTL sweep worker");

    loop {
        ticker.tick().await;
        match table.sweep_expired(now_epoch()).await {
            Ok(count) if count > 0 => info!(deleted = count, "TTL sweep reclaimed expired rows"),
            Ok(_) => {}
            Err(e) => error!(error = %e, "TTL sweep failed"),
        }
    }
}
