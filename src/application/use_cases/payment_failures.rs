//! Dunning ladder: reacts to failed and successful invoice payments.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    application::ports::{
        notification::{DunningEmail, NotificationGateway, SubscriptionEmail},
        payment_portal::{PaymentPortal, fallback_portal_url},
    },
    domain::entities::{
        account_status::AccountStatus,
        billing_record::{
            BillingRecord, DunningStage, GraceSource, SUSPENSION_COUNTDOWN_DAYS, TriggeredBy,
        },
        delivery_mode::DeliveryMode,
        plan::Plan,
        stripe_event::{StripeCharge, StripeInvoice},
    },
    use_cases::{
        billing_record::{BillingRecordStore, Modified, Mutation},
        plan_catalog::PlanCatalog,
        resource_archiver::ResourceArchiver,
        user_directory::{UserProfile, UserRepoTrait, find_recipient},
    },
};

pub struct DunningSettings {
    /// Where the payment portal sends the customer back to.
    pub portal_return_url: String,
    pub support_email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentFailureOutcome {
    SubscriptionNotFound,
    SkippedCanceled,
    SkippedGracePeriod,
    SkippedFreePlan,
    Escalated {
        count: i32,
        stage: DunningStage,
        notified: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentRecoveryOutcome {
    SubscriptionNotFound,
    NormalRenewal,
    SkippedCanceled,
    Recovered { previous_failures: i32 },
}

struct FailureStep {
    count: i32,
    stage: DunningStage,
    notify: bool,
}

fn failure_skip_reason(record: &BillingRecord, now: DateTime<Utc>) -> Option<PaymentFailureOutcome> {
    if record.status.is_canceled() {
        Some(PaymentFailureOutcome::SkippedCanceled)
    } else if record.has_active_grace_period(now) {
        Some(PaymentFailureOutcome::SkippedGracePeriod)
    } else {
        None
    }
}

fn recovery_skip_reason(record: &BillingRecord) -> Option<PaymentRecoveryOutcome> {
    if record.payment_failures.count == 0 {
        Some(PaymentRecoveryOutcome::NormalRenewal)
    } else if record.status.is_canceled() {
        Some(PaymentRecoveryOutcome::SkippedCanceled)
    } else {
        None
    }
}

pub struct PaymentFailureUseCases {
    store: Arc<BillingRecordStore>,
    users: Arc<dyn UserRepoTrait>,
    catalog: Arc<PlanCatalog>,
    archiver: Arc<ResourceArchiver>,
    notifier: Arc<dyn NotificationGateway>,
    portal: Arc<dyn PaymentPortal>,
    settings: DunningSettings,
}

impl PaymentFailureUseCases {
    pub fn new(
        store: Arc<BillingRecordStore>,
        users: Arc<dyn UserRepoTrait>,
        catalog: Arc<PlanCatalog>,
        archiver: Arc<ResourceArchiver>,
        notifier: Arc<dyn NotificationGateway>,
        portal: Arc<dyn PaymentPortal>,
        settings: DunningSettings,
    ) -> Self {
        Self {
            store,
            users,
            catalog,
            archiver,
            notifier,
            portal,
            settings,
        }
    }

    // ========================================================================
    // invoice.payment_failed
    // ========================================================================

    pub async fn handle_payment_failed(
        &self,
        invoice: &StripeInvoice,
        mode: DeliveryMode,
        now: DateTime<Utc>,
    ) -> AppResult<PaymentFailureOutcome> {
        let Some(record) = self.find_record(invoice).await? else {
            return Ok(PaymentFailureOutcome::SubscriptionNotFound);
        };

        if let Some(skip) = failure_skip_reason(&record, now) {
            info!(
                subscription_id = %record.stripe_subscription_id,
                outcome = ?skip,
                "Ignoring payment failure"
            );
            return Ok(skip);
        }

        if self.catalog.is_free(record.plan).await {
            info!(
                subscription_id = %record.stripe_subscription_id,
                plan = %record.plan,
                "Ignoring payment failure on free plan"
            );
            return Ok(PaymentFailureOutcome::SkippedFreePlan);
        }

        if let Some(attempts) = invoice.attempt_count {
            debug!(
                subscription_id = %record.stripe_subscription_id,
                provider_attempts = attempts,
                local_failures = record.payment_failures.count,
                "Provider attempt count (informational)"
            );
        }

        let reason = invoice.failure_reason();
        let code = invoice.failure_code();
        let next_retry_at = invoice.next_retry_at();

        let modified = self
            .store
            .modify(record, now, |r| {
                if let Some(skip) = failure_skip_reason(r, now) {
                    return Mutation::Skip(skip);
                }

                let count = r.record_payment_failure(now, reason.clone(), code.clone(), next_retry_at);
                let stage = DunningStage::for_count(count);

                match stage {
                    DunningStage::FirstWarning => r.account_status = AccountStatus::AtRisk,
                    DunningStage::SecondWarning => {}
                    DunningStage::FinalWarning => r.account_status = AccountStatus::Suspended,
                    DunningStage::SuspensionNotice => {
                        r.account_status = AccountStatus::GracePeriod;
                        if !r.has_scheduled_grace_period() {
                            r.start_payment_grace_period(now);
                        }
                    }
                }

                let notify = r.claim_stage_notification(stage, now);
                r.push_history(
                    format!("payment_failed (attempt {}): {}", count, reason),
                    TriggeredBy::Webhook,
                    now,
                );

                Mutation::Apply(FailureStep {
                    count,
                    stage,
                    notify,
                })
            })
            .await?;

        let (record, step) = match modified {
            Modified::Saved(record, step) => (record, step),
            Modified::Skipped(_, skip) => return Ok(skip),
        };

        info!(
            subscription_id = %record.stripe_subscription_id,
            count = step.count,
            stage = %step.stage,
            account_status = %record.account_status,
            "Payment failure recorded"
        );

        if step.stage == DunningStage::FinalWarning {
            self.set_premium_suspended(record.user_id, true, now).await;
        }

        let notified = if step.notify {
            self.send_stage_email(&record, invoice, step.stage, mode).await
        } else {
            debug!(
                subscription_id = %record.stripe_subscription_id,
                stage = %step.stage,
                "Stage notification already sent"
            );
            false
        };

        Ok(PaymentFailureOutcome::Escalated {
            count: step.count,
            stage: step.stage,
            notified,
        })
    }

    // ========================================================================
    // invoice.paid / invoice.payment_succeeded
    // ========================================================================

    pub async fn handle_payment_succeeded(
        &self,
        invoice: &StripeInvoice,
        mode: DeliveryMode,
        now: DateTime<Utc>,
    ) -> AppResult<PaymentRecoveryOutcome> {
        let Some(record) = self.find_record(invoice).await? else {
            return Ok(PaymentRecoveryOutcome::SubscriptionNotFound);
        };

        if let Some(skip) = recovery_skip_reason(&record) {
            debug!(
                subscription_id = %record.stripe_subscription_id,
                outcome = ?skip,
                "No recovery needed"
            );
            return Ok(skip);
        }

        let modified = self
            .store
            .modify(record, now, |r| {
                if let Some(skip) = recovery_skip_reason(r) {
                    return Mutation::Skip(skip);
                }

                let previous_failures = r.payment_failures.count;
                r.reset_payment_failures();
                if r.account_status != AccountStatus::Active {
                    r.account_status = AccountStatus::Active;
                }
                let ladder_grace = r.downgrade_grace_period.as_ref().is_some_and(|g| {
                    g.calculated_from == GraceSource::PaymentFailed && g.auto_archive_scheduled
                });
                if ladder_grace {
                    r.downgrade_grace_period = None;
                }
                r.complete_recovery(now);
                r.push_history("payment_recovered", TriggeredBy::Webhook, now);

                Mutation::Apply(previous_failures)
            })
            .await?;

        let (record, previous_failures) = match modified {
            Modified::Saved(record, previous) => (record, previous),
            Modified::Skipped(_, skip) => return Ok(skip),
        };

        info!(
            subscription_id = %record.stripe_subscription_id,
            previous_failures,
            "Payment recovered"
        );

        if previous_failures >= 3 {
            self.set_premium_suspended(record.user_id, false, now).await;
        }

        if let Some(user) = find_recipient(self.users.as_ref(), record.user_id).await {
            let email = SubscriptionEmail::PaymentRecovered {
                plan_name: self.catalog.entry(record.plan).await.name,
            };
            if let Err(e) = self
                .notifier
                .send_subscription_email(&user.email, &email, mode)
                .await
            {
                warn!(
                    subscription_id = %record.stripe_subscription_id,
                    error = %e,
                    "Failed to send payment recovered email"
                );
            }
        }

        Ok(PaymentRecoveryOutcome::Recovered { previous_failures })
    }

    // ========================================================================
    // charge.failed
    // ========================================================================

    /// Logs the charge failure. The matching `invoice.payment_failed` event
    /// drives the ladder.
    pub async fn handle_charge_failed(&self, charge: &StripeCharge) -> AppResult<()> {
        let record_id = match charge.customer.as_deref() {
            Some(customer_id) => self
                .store
                .get_by_customer_id(customer_id)
                .await?
                .map(|r| r.id),
            None => None,
        };

        warn!(
            charge_id = %charge.id,
            customer_id = charge.customer.as_deref().unwrap_or("-"),
            invoice_id = charge.invoice.as_deref().unwrap_or("-"),
            record_id = ?record_id,
            amount = charge.amount,
            currency = %charge.currency,
            failure_code = charge.failure_code.as_deref().unwrap_or("-"),
            failure_message = charge.failure_message.as_deref().unwrap_or("-"),
            "Charge failed"
        );
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn find_record(&self, invoice: &StripeInvoice) -> AppResult<Option<BillingRecord>> {
        let Some(subscription_id) = invoice.subscription_id() else {
            warn!(invoice_id = %invoice.id, "Invoice has no subscription, ignoring");
            return Ok(None);
        };

        let record = self.store.get_by_subscription_id(subscription_id).await?;
        if record.is_none() {
            warn!(
                invoice_id = %invoice.id,
                subscription_id,
                "No billing record for subscription"
            );
        }
        Ok(record)
    }

    async fn set_premium_suspended(&self, user_id: Uuid, suspended: bool, now: DateTime<Utc>) {
        if let Err(e) = self
            .users
            .set_premium_suspended(user_id, suspended, now)
            .await
        {
            error!(
                user_id = %user_id,
                suspended,
                error = %e,
                "Failed to update premium suspension"
            );
        }
    }

    async fn update_payment_url(&self, customer_id: &str) -> String {
        match self
            .portal
            .generate_update_payment_url(customer_id, &self.settings.portal_return_url)
            .await
        {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    customer_id,
                    error = %e,
                    "Payment portal unavailable, using fallback URL"
                );
                fallback_portal_url(customer_id)
            }
        }
    }

    /// Sends the stage email. Returns whether it was delivered.
    async fn send_stage_email(
        &self,
        record: &BillingRecord,
        invoice: &StripeInvoice,
        stage: DunningStage,
        mode: DeliveryMode,
    ) -> bool {
        let Some(user) = find_recipient(self.users.as_ref(), record.user_id).await else {
            return false;
        };

        let email = self.build_stage_email(record, invoice, stage, &user).await;

        match self
            .notifier
            .send_payment_failed_email(&user.email, stage, &email, mode)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    subscription_id = %record.stripe_subscription_id,
                    stage = %stage,
                    error = %e,
                    "Failed to send dunning email"
                );
                false
            }
        }
    }

    async fn build_stage_email(
        &self,
        record: &BillingRecord,
        invoice: &StripeInvoice,
        stage: DunningStage,
        user: &UserProfile,
    ) -> DunningEmail {
        let mut email = DunningEmail {
            recipient_name: user.display_name.clone(),
            plan_name: self.catalog.entry(record.plan).await.name,
            amount_cents: invoice.amount_due,
            currency: invoice.currency.clone(),
            failure_reason: invoice.failure_reason(),
            next_retry_date: invoice.next_retry_at(),
            update_payment_url: self.update_payment_url(&record.stripe_customer_id).await,
            support_email: self.settings.support_email.clone(),
            ..DunningEmail::default()
        };

        match stage {
            DunningStage::FirstWarning => {}
            DunningStage::SecondWarning => {
                email.current_usage = self
                    .archiver
                    .usage(record.user_id)
                    .await
                    .inspect_err(|e| warn!(error = %e, "Usage snapshot unavailable"))
                    .ok();
                email.days_until_suspension = Some(SUSPENSION_COUNTDOWN_DAYS);
            }
            DunningStage::FinalWarning => {
                email.affected_features = self
                    .catalog
                    .features_for(record.plan)
                    .await
                    .enabled_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
            }
            DunningStage::SuspensionNotice => {
                let free_limits = self.catalog.limits_for(Plan::Free).await;
                email.items_to_archive = self
                    .archiver
                    .excess(record.user_id, &free_limits)
                    .await
                    .inspect_err(|e| warn!(error = %e, "Archive preview unavailable"))
                    .ok();
                email.grace_period_end_date =
                    record.downgrade_grace_period.as_ref().map(|g| g.expires_at);
            }
        }

        email
    }
}
