use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use super::{
    account_status::AccountStatus,
    plan::{Plan, PlanFeatures, PlanLimits},
    subscription_status::SubscriptionStatus,
};

/// Days between the fourth failed payment and archiving.
pub const PAYMENT_GRACE_PERIOD_DAYS: i64 = 15;
/// Days of countdown announced in the second warning.
pub const SUSPENSION_COUNTDOWN_DAYS: i64 = 3;

/// Who caused a status change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggeredBy {
    Webhook,
    GracePeriodProcessor,
    System,
}

/// Origin of a downgrade grace period.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GraceSource {
    #[default]
    Downgrade,
    Cancellation,
    PaymentFailed,
}

/// Rungs of the dunning ladder, each with its own one-shot notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DunningStage {
    FirstWarning,
    SecondWarning,
    FinalWarning,
    SuspensionNotice,
}

impl DunningStage {
    /// Stage reached at a given (positive) failure count.
    pub fn for_count(count: i32) -> Self {
        match count {
            i32::MIN..=1 => DunningStage::FirstWarning,
            2 => DunningStage::SecondWarning,
            3 => DunningStage::FinalWarning,
            _ => DunningStage::SuspensionNotice,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationFlag {
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationsSent {
    pub first_warning: NotificationFlag,
    pub second_warning: NotificationFlag,
    pub final_warning: NotificationFlag,
    pub suspension_notice: NotificationFlag,
}

impl NotificationsSent {
    pub fn flag(&self, stage: DunningStage) -> &NotificationFlag {
        match stage {
            DunningStage::FirstWarning => &self.first_warning,
            DunningStage::SecondWarning => &self.second_warning,
            DunningStage::FinalWarning => &self.final_warning,
            DunningStage::SuspensionNotice => &self.suspension_notice,
        }
    }

    fn flag_mut(&mut self, stage: DunningStage) -> &mut NotificationFlag {
        match stage {
            DunningStage::FirstWarning => &mut self.first_warning,
            DunningStage::SecondWarning => &mut self.second_warning,
            DunningStage::FinalWarning => &mut self.final_warning,
            DunningStage::SuspensionNotice => &mut self.suspension_notice,
        }
    }

    pub fn any_sent(&self) -> bool {
        self.first_warning.sent
            || self.second_warning.sent
            || self.final_warning.sent
            || self.suspension_notice.sent
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentFailures {
    pub count: i32,
    pub first_failed_at: Option<DateTime<Utc>>,
    pub last_failed_at: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<String>,
    pub last_failure_code: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub notifications_sent: NotificationsSent,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentRecovery {
    pub in_recovery: bool,
    pub recovery_started_at: Option<DateTime<Utc>>,
    pub recovery_ended_at: Option<DateTime<Utc>>,
    pub last_recovery_attempt: Option<DateTime<Utc>>,
    pub recovery_attempts: i32,
    pub recovered_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DowngradeGracePeriod {
    pub previous_plan: Plan,
    pub target_plan: Plan,
    pub expires_at: DateTime<Utc>,
    pub auto_archive_scheduled: bool,
    #[serde(default)]
    pub reminder_3_days_sent: bool,
    #[serde(default)]
    pub reminder_1_day_sent: bool,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub immediate_cancel: bool,
    #[serde(default)]
    pub calculated_from: GraceSource,
}

impl DowngradeGracePeriod {
    /// Whole days until expiry, rounded up.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        let secs = (self.expires_at - now).num_seconds();
        if secs <= 0 {
            0
        } else {
            (secs + 86_399) / 86_400
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: AccountStatus,
    pub changed_at: DateTime<Utc>,
    pub reason: String,
    pub triggered_by: TriggeredBy,
}

/// Per-subscription billing state.
///
/// `limits` and `features` are derived from `plan`; change them only through
/// [`BillingRecord::apply_plan`]. `version` is the optimistic-concurrency token
/// checked and bumped by every store write.
#[derive(Debug, Clone)]
pub struct BillingRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub stripe_price_id: Option<String>,
    pub plan: Plan,
    pub status: SubscriptionStatus,
    pub account_status: AccountStatus,
    pub payment_failures: PaymentFailures,
    pub payment_recovery: PaymentRecovery,
    pub downgrade_grace_period: Option<DowngradeGracePeriod>,
    pub status_history: Vec<StatusHistoryEntry>,
    pub limits: PlanLimits,
    pub features: PlanFeatures,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BillingRecord {
    pub fn apply_plan(&mut self, plan: Plan, limits: PlanLimits, features: PlanFeatures) {
        self.plan = plan;
        self.limits = limits;
        self.features = features;
    }

    /// A scheduled grace period that has not yet expired.
    pub fn has_active_grace_period(&self, now: DateTime<Utc>) -> bool {
        self.downgrade_grace_period
            .as_ref()
            .is_some_and(|g| g.auto_archive_scheduled && g.expires_at > now)
    }

    pub fn has_scheduled_grace_period(&self) -> bool {
        self.downgrade_grace_period
            .as_ref()
            .is_some_and(|g| g.auto_archive_scheduled)
    }

    /// Between the first and third failure the ladder still owns the account.
    pub fn is_dunning_mid_flight(&self) -> bool {
        (1..=3).contains(&self.payment_failures.count)
    }

    /// Records one failed payment and returns the new failure count.
    pub fn record_payment_failure(
        &mut self,
        now: DateTime<Utc>,
        reason: String,
        code: Option<String>,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> i32 {
        let failures = &mut self.payment_failures;
        failures.count += 1;
        if failures.first_failed_at.is_none() {
            failures.first_failed_at = Some(now);
        }
        failures.last_failed_at = Some(now);
        failures.last_failure_reason = Some(reason);
        failures.last_failure_code = code;
        failures.next_retry_at = next_retry_at;

        let recovery = &mut self.payment_recovery;
        recovery.in_recovery = true;
        if recovery.recovery_started_at.is_none() {
            recovery.recovery_started_at = Some(now);
        }
        recovery.last_recovery_attempt = Some(now);
        recovery.recovery_attempts += 1;

        failures.count
    }

    /// Marks the stage's notification as sent. Returns `false` if it already was.
    pub fn claim_stage_notification(&mut self, stage: DunningStage, now: DateTime<Utc>) -> bool {
        let flag = self.payment_failures.notifications_sent.flag_mut(stage);
        if flag.sent {
            return false;
        }
        flag.sent = true;
        flag.sent_at = Some(now);
        true
    }

    /// Appends a history entry for the current account status.
    pub fn push_history(&mut self, reason: impl Into<String>, by: TriggeredBy, now: DateTime<Utc>) {
        self.status_history.push(StatusHistoryEntry {
            status: self.account_status,
            changed_at: now,
            reason: reason.into(),
            triggered_by: by,
        });
    }

    /// Opens the payment-failure grace period that leads to archiving.
    pub fn start_payment_grace_period(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        let expires_at = now + Duration::days(PAYMENT_GRACE_PERIOD_DAYS);
        self.downgrade_grace_period = Some(DowngradeGracePeriod {
            previous_plan: self.plan,
            target_plan: Plan::Free,
            expires_at,
            auto_archive_scheduled: true,
            reminder_3_days_sent: false,
            reminder_1_day_sent: false,
            processed_at: None,
            immediate_cancel: false,
            calculated_from: GraceSource::PaymentFailed,
        });
        expires_at
    }

    pub fn close_grace_period(&mut self, now: DateTime<Utc>) {
        if let Some(grace) = self.downgrade_grace_period.as_mut() {
            grace.auto_archive_scheduled = false;
            grace.processed_at = Some(now);
        }
    }

    pub fn reset_payment_failures(&mut self) {
        self.payment_failures = PaymentFailures::default();
    }

    pub fn complete_recovery(&mut self, now: DateTime<Utc>) {
        let recovery = &mut self.payment_recovery;
        recovery.in_recovery = false;
        recovery.recovered_at = Some(now);
        recovery.recovery_ended_at = Some(now);
    }
}
