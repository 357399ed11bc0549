use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    app_error::AppResult,
    application::ports::notification::{NotificationGateway, SubscriptionEmail},
    domain::entities::{
        account_status::AccountStatus,
        alert::NewAlert,
        billing_record::{BillingRecord, GraceSource, PAYMENT_GRACE_PERIOD_DAYS, TriggeredBy},
        delivery_mode::DeliveryMode,
        plan::Plan,
        subscription_status::SubscriptionStatus,
    },
    use_cases::{
        alerts::AlertRepoTrait,
        billing_record::{BillingRecordStore, Modified, Mutation},
        plan_catalog::PlanCatalog,
        resource_archiver::ResourceArchiver,
        user_directory::{UserRepoTrait, find_recipient},
    },
};

/// Reminders are sent for grace periods expiring within this many days.
pub const REMINDER_WINDOW_DAYS: i64 = 3;
/// Closed grace periods and stale dunning flags are cleared after this many days.
pub const CLEANUP_AFTER_DAYS: i64 = 30;

/// Totals from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Downgrade grace periods that expired and were processed.
    pub archived: u64,
    pub payment_grace_processed: u64,
    pub reminders_sent: u64,
    pub cleaned: u64,
    /// Individual items archived across both expiry passes.
    pub items_archived: i64,
    pub errors: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reminder {
    ThreeDays,
    OneDay,
}

/// Periodic job that expires grace periods, sends reminders and cleans up.
pub struct GracePeriodSweeper {
    store: Arc<BillingRecordStore>,
    users: Arc<dyn UserRepoTrait>,
    catalog: Arc<PlanCatalog>,
    archiver: Arc<ResourceArchiver>,
    notifier: Arc<dyn NotificationGateway>,
    alerts: Arc<dyn AlertRepoTrait>,
    mode: DeliveryMode,
}

impl GracePeriodSweeper {
    pub fn new(
        store: Arc<BillingRecordStore>,
        users: Arc<dyn UserRepoTrait>,
        catalog: Arc<PlanCatalog>,
        archiver: Arc<ResourceArchiver>,
        notifier: Arc<dyn NotificationGateway>,
        alerts: Arc<dyn AlertRepoTrait>,
        mode: DeliveryMode,
    ) -> Self {
        Self {
            store,
            users,
            catalog,
            archiver,
            notifier,
            alerts,
            mode,
        }
    }

    /// Runs all four passes. Each pass isolates per-record failures.
    pub async fn run_once(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        self.expire_grace_periods(now, &mut report).await;
        self.expire_payment_grace(now, &mut report).await;
        self.send_reminders(now, &mut report).await;
        self.cleanup(now, &mut report).await;

        info!(
            archived = report.archived,
            payment_grace_processed = report.payment_grace_processed,
            reminders_sent = report.reminders_sent,
            cleaned = report.cleaned,
            items_archived = report.items_archived,
            errors = report.errors,
            "Grace period sweep finished"
        );
        report
    }

    // ========================================================================
    // Pass 1: expired downgrade grace periods
    // ========================================================================

    async fn expire_grace_periods(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let records = match self.store.list_expired_grace_periods(now).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to list expired grace periods");
                report.errors += 1;
                return;
            }
        };

        for record in records {
            let record_id = record.id;
            match self.expire_grace_period(record, now).await {
                Ok(Some(items)) => {
                    report.archived += 1;
                    report.items_archived += items;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(record_id = %record_id, error = %e, "Failed to process expired grace period");
                    report.errors += 1;
                }
            }
        }
    }

    /// Returns the number of archived items, or `None` if the record was left alone.
    async fn expire_grace_period(&self, record: BillingRecord, now: DateTime<Utc>) -> AppResult<Option<i64>> {
        let Some(grace) = record.downgrade_grace_period.clone() else {
            return Ok(None);
        };

        if grace.calculated_from == GraceSource::PaymentFailed {
            debug!(record_id = %record.id, "Payment-failure grace period, handled by payment grace pass");
            return Ok(None);
        }

        if record.is_dunning_mid_flight() {
            info!(
                record_id = %record.id,
                failures = record.payment_failures.count,
                "Dunning in progress, deferring grace period expiry"
            );
            return Ok(None);
        }

        let limits = self.catalog.limits_for(grace.target_plan).await;
        let archived = self
            .archiver
            .archive_excess(record.user_id, &limits, now)
            .await?;

        let modified = self
            .store
            .modify(record, now, |r| {
                if !r.has_scheduled_grace_period() {
                    return Mutation::Skip(());
                }
                r.close_grace_period(now);
                r.push_history(
                    format!("grace_period_expired: downgraded to {}", grace.target_plan),
                    TriggeredBy::GracePeriodProcessor,
                    now,
                );
                Mutation::Apply(())
            })
            .await?;

        let record = match modified {
            Modified::Saved(record, ()) => record,
            Modified::Skipped(..) => return Ok(None),
        };

        info!(
            record_id = %record.id,
            target_plan = %grace.target_plan,
            archived = archived.total(),
            "Grace period expired"
        );

        let email = if archived.total() > 0 {
            SubscriptionEmail::GracePeriodExpired {
                target_plan: grace.target_plan,
                archived,
            }
        } else {
            SubscriptionEmail::GracePeriodWithinLimits {
                target_plan: grace.target_plan,
            }
        };
        self.notify(&record, &email).await;
        if archived.total() > 0 {
            self.raise_alert(NewAlert::auto_archive_completed(record.user_id, archived.total()), now)
                .await;
        }

        Ok(Some(archived.total()))
    }

    // ========================================================================
    // Pass 2: expired payment-failure grace periods
    // ========================================================================

    async fn expire_payment_grace(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let cutoff = now - Duration::days(PAYMENT_GRACE_PERIOD_DAYS);
        let records = match self.store.list_expired_payment_grace(cutoff).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to list expired payment grace periods");
                report.errors += 1;
                return;
            }
        };

        for record in records {
            let record_id = record.id;
            match self.archive_for_nonpayment(record, now).await {
                Ok(Some(items)) => {
                    report.payment_grace_processed += 1;
                    report.items_archived += items;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(record_id = %record_id, error = %e, "Failed to process payment grace expiry");
                    report.errors += 1;
                }
            }
        }
    }

    async fn archive_for_nonpayment(&self, record: BillingRecord, now: DateTime<Utc>) -> AppResult<Option<i64>> {
        let free = self.catalog.entry(Plan::Free).await;
        let archived = self
            .archiver
            .archive_excess(record.user_id, &free.limits, now)
            .await?;

        let modified = self
            .store
            .modify(record, now, |r| {
                if r.account_status != AccountStatus::GracePeriod {
                    return Mutation::Skip(());
                }
                r.account_status = AccountStatus::Archived;
                r.apply_plan(Plan::Free, free.limits, free.features);
                r.status = SubscriptionStatus::Canceled;
                r.close_grace_period(now);
                r.push_history(
                    format!(
                        "payment_grace_expired: {} failed payments, downgraded to free",
                        r.payment_failures.count
                    ),
                    TriggeredBy::GracePeriodProcessor,
                    now,
                );
                Mutation::Apply(())
            })
            .await?;

        let record = match modified {
            Modified::Saved(record, ()) => record,
            Modified::Skipped(..) => return Ok(None),
        };

        if let Err(e) = self
            .users
            .set_subscription_plan(record.user_id, Plan::Free)
            .await
        {
            error!(user_id = %record.user_id, error = %e, "Failed to downgrade user plan");
        }

        info!(
            record_id = %record.id,
            archived = archived.total(),
            "Account archived after payment grace period"
        );
        self.raise_alert(
            NewAlert::account_archived_for_nonpayment(record.user_id, archived.total()),
            now,
        )
        .await;
        Ok(Some(archived.total()))
    }

    // ========================================================================
    // Pass 3: reminders
    // ========================================================================

    async fn send_reminders(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let horizon = now + Duration::days(REMINDER_WINDOW_DAYS);
        let records = match self
            .store
            .list_grace_periods_expiring_between(now, horizon)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to list grace periods for reminders");
                report.errors += 1;
                return;
            }
        };

        for record in records {
            let record_id = record.id;
            match self.send_reminder(record, now).await {
                Ok(true) => report.reminders_sent += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(record_id = %record_id, error = %e, "Failed to send grace period reminder");
                    report.errors += 1;
                }
            }
        }
    }

    fn due_reminder(record: &BillingRecord, now: DateTime<Utc>) -> Option<Reminder> {
        let grace = record.downgrade_grace_period.as_ref()?;
        let days = grace.days_remaining(now);
        if days <= 1 && !grace.reminder_1_day_sent {
            Some(Reminder::OneDay)
        } else if days <= REMINDER_WINDOW_DAYS && !grace.reminder_3_days_sent {
            Some(Reminder::ThreeDays)
        } else {
            None
        }
    }

    async fn send_reminder(&self, record: BillingRecord, now: DateTime<Utc>) -> AppResult<bool> {
        if Self::due_reminder(&record, now).is_none() {
            return Ok(false);
        }

        // Claim the reminder before sending so concurrent sweeps cannot double-send.
        let modified = self
            .store
            .modify(record, now, |r| {
                let Some(reminder) = Self::due_reminder(r, now) else {
                    return Mutation::Skip(());
                };
                let Some(grace) = r.downgrade_grace_period.as_mut() else {
                    return Mutation::Skip(());
                };
                match reminder {
                    Reminder::OneDay => grace.reminder_1_day_sent = true,
                    Reminder::ThreeDays => grace.reminder_3_days_sent = true,
                }
                Mutation::Apply(grace.clone())
            })
            .await?;

        let (record, grace) = match modified {
            Modified::Saved(record, grace) => (record, grace),
            Modified::Skipped(..) => return Ok(false),
        };

        let usage = self.archiver.usage(record.user_id).await?;
        let limits = self.catalog.limits_for(grace.target_plan).await;
        let email = SubscriptionEmail::GracePeriodReminder {
            target_plan: grace.target_plan,
            days_remaining: grace.days_remaining(now),
            expires_at: grace.expires_at,
            usage,
            limits,
            excess: usage.excess_over(&limits),
        };

        Ok(self.notify(&record, &email).await)
    }

    // ========================================================================
    // Pass 4: cleanup
    // ========================================================================

    async fn cleanup(&self, now: DateTime<Utc>, report: &mut SweepReport) {
        let cutoff = now - Duration::days(CLEANUP_AFTER_DAYS);

        match self.store.clear_stale_grace_periods(cutoff, now).await {
            Ok(n) => report.cleaned += n,
            Err(e) => {
                error!(error = %e, "Failed to clear stale grace periods");
                report.errors += 1;
            }
        }

        match self.store.clear_stale_notification_flags(cutoff, now).await {
            Ok(n) => report.cleaned += n,
            Err(e) => {
                error!(error = %e, "Failed to clear stale dunning flags");
                report.errors += 1;
            }
        }
    }

    async fn raise_alert(&self, alert: NewAlert, now: DateTime<Utc>) {
        if let Err(e) = self.alerts.create(&alert, now).await {
            warn!(user_id = %alert.user_id, title = %alert.title, error = %e, "Failed to create alert");
        }
    }

    async fn notify(&self, record: &BillingRecord, email: &SubscriptionEmail) -> bool {
        let Some(user) = find_recipient(self.users.as_ref(), record.user_id).await else {
            return false;
        };
        match self
            .notifier
            .send_subscription_email(&user.email, email, self.mode)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    record_id = %record.id,
                    kind = email.kind(),
                    error = %e,
                    "Failed to send grace period email"
                );
                false
            }
        }
    }
}
