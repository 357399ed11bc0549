use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tracing::{info, warn};

use crate::use_cases::grace_period::GracePeriodSweeper;

/// Runs the grace-period sweep every `interval_secs`, starting immediately.
///
/// Sweeps never overlap: the next tick waits for the current run to finish.
pub async fn run_grace_period_loop(sweeper: Arc<GracePeriodSweeper>, interval_secs: u64) {
    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

    info!(
        "Grace period sweeper started (running every {}s)",
        interval_secs
    );

    loop {
        ticker.tick().await;

        let report = sweeper.run_once(Utc::now()).await;
        if report.errors > 0 {
            warn!(
                archived = report.archived,
                payment_grace_processed = report.payment_grace_processed,
                reminders_sent = report.reminders_sent,
                cleaned = report.cleaned,
                items_archived = report.items_archived,
                errors = report.errors,
                "Grace period sweep finished with errors"
            );
        } else {
            info!(
                archived = report.archived,
                payment_grace_processed = report.payment_grace_processed,
                reminders_sent = report.reminders_sent,
                cleaned = report.cleaned,
                items_archived = report.items_archived,
                "Grace period sweep finished"
            );
        }
    }
}
