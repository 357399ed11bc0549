use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info};

use crate::use_cases::stripe_events::StripeEventUseCases;

/// Ledger entries are purged once a day regardless of the retry cadence.
const PURGE_INTERVAL_SECS: u64 = 86_400;

/// Re-drives failed webhook events and purges old ledger entries.
pub async fn run_webhook_retry_loop(stripe_events: Arc<StripeEventUseCases>, interval_secs: u64) {
    let mut retry_ticker = interval(Duration::from_secs(interval_secs.max(1)));
    let mut purge_ticker = interval(Duration::from_secs(PURGE_INTERVAL_SECS));

    info!(
        "Webhook retry worker started (retrying every {}s)",
        interval_secs
    );

    loop {
        tokio::select! {
            _ = retry_ticker.tick() => {
                retry_failed(&stripe_events).await;
            }
            _ = purge_ticker.tick() => {
                purge_expired(&stripe_events).await;
            }
        }
    }
}

async fn retry_failed(stripe_events: &StripeEventUseCases) {
    match stripe_events.retry_failed(Utc::now()).await {
        Ok(report) if report.attempted == 0 => {}
        Ok(report) => {
            info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                failed = report.failed,
                "Retried failed webhook events"
            );
        }
        Err(e) => error!(error = %e, "Failed to list retryable webhook events"),
    }
}

async fn purge_expired(stripe_events: &StripeEventUseCases) {
    match stripe_events.purge_expired(Utc::now()).await {
        Ok(0) => {}
        Ok(count) => info!(count, "Purged expired webhook events"),
        Err(e) => error!(error = %e, "Failed to purge webhook events"),
    }
}
