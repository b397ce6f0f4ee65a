use std::sync::Arc;
use std::time::Duration;

use time::{OffsetDateTime, Time};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{error, info};

use super::repo::CodeStore;

/// One sweep: deletes every code whose expiry is before `now`.
pub async fn sweep_once(codes: &dyn CodeStore, now: OffsetDateTime) -> anyhow::Result<u64> {
    let removed = codes.delete_expired(now).await?;
    info!(removed, "expired verification codes deleted");
    Ok(removed)
}

/// Time left until the next UTC midnight.
pub fn until_next_midnight(now: OffsetDateTime) -> Duration {
    let next = now
        .date()
        .next_day()
        .map(|d| d.with_time(Time::MIDNIGHT).assume_utc())
        .unwrap_or(now);
    let secs = (next - now).whole_seconds().max(0) as u64;
    Duration::from_secs(secs)
}

/// Runs a sweep at the next UTC midnight and then every `every`. A failed
/// sweep is logged and the schedule continues.
pub fn spawn(codes: Arc<dyn CodeStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let first = Instant::now() + until_next_midnight(OffsetDateTime::now_utc());
        let mut ticker = tokio::time::interval_at(first, every);
        info!(every_secs = every.as_secs(), "codes cleanup scheduled");
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(codes.as_ref(), OffsetDateTime::now_utc()).await {
                error!(error = %e, "codes cleanup failed");
            }
        }
    })
}
