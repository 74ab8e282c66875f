//! Background cleanup task: prune expired slots and idle rate-limit buckets.

use crate::rate_limit::RateLimiter;
use crate::storage::RelayStorage;
use std::time::Duration;
use tokio::time;

const IDLE_BUCKET_RETENTION: Duration = Duration::from_secs(600);

pub fn spawn_cleanup_task(storage: RelayStorage, limiter: RateLimiter, every: Duration) {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = run_cleanup(&storage, &limiter) {
                tracing::error!("Cleanup error: {}", e);
            }
        }
    });
}

fn run_cleanup(storage: &RelayStorage, limiter: &RateLimiter) -> Result<(), String> {
    let now = chrono::Utc::now().timestamp();

    let slots = storage.prune_expired(now).map_err(|e| e.to_string())?;
    let buckets = limiter.prune_idle(IDLE_BUCKET_RETENTION);
    let remaining = storage.slot_count().map_err(|e| e.to_string())?;

    tracing::debug!(
        "Cleanup completed: pruned {} slots and {} buckets, {} slots live",
        slots,
        buckets,
        remaining
    );
    Ok(())
}
