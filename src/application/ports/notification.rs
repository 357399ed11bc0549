use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    app_error::AppResult,
    domain::entities::{
        billing_record::DunningStage,
        delivery_mode::DeliveryMode,
        plan::{Plan, PlanLimits},
        resource::ResourceCounts,
    },
};

// ============================================================================
// Payloads
// ============================================================================

/// Everything a dunning email may show. Each stage uses a subset.
#[derive(Debug, Clone, Default)]
pub struct DunningEmail {
    pub recipient_name: Option<String>,
    pub plan_name: String,
    pub amount_cents: i64,
    pub currency: String,
    pub failure_reason: String,
    pub next_retry_date: Option<DateTime<Utc>>,
    pub update_payment_url: String,
    pub current_usage: Option<ResourceCounts>,
    pub days_until_suspension: Option<i64>,
    pub affected_features: Vec<String>,
    pub items_to_archive: Option<ResourceCounts>,
    pub grace_period_end_date: Option<DateTime<Utc>>,
    pub support_email: String,
}

/// Account lifecycle emails outside the dunning ladder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEmail {
    PaymentRecovered {
        plan_name: String,
    },
    GracePeriodExpired {
        target_plan: Plan,
        archived: ResourceCounts,
    },
    GracePeriodWithinLimits {
        target_plan: Plan,
    },
    GracePeriodReminder {
        target_plan: Plan,
        days_remaining: i64,
        expires_at: DateTime<Utc>,
        usage: ResourceCounts,
        limits: PlanLimits,
        excess: ResourceCounts,
    },
}

impl SubscriptionEmail {
    pub fn kind(&self) -> &'static str {
        match self {
            SubscriptionEmail::PaymentRecovered { .. } => "payment_recovered",
            SubscriptionEmail::GracePeriodExpired { .. } => "grace_period_expired",
            SubscriptionEmail::GracePeriodWithinLimits { .. } => "grace_period_within_limits",
            SubscriptionEmail::GracePeriodReminder { .. } => "grace_period_reminder",
        }
    }
}

// ============================================================================
// Port
// ============================================================================

/// Outbound email delivery. Implementations decide per `mode` whether the
/// recipient may receive mail at all.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_payment_failed_email(
        &self,
        to: &str,
        stage: DunningStage,
        email: &DunningEmail,
        mode: DeliveryMode,
    ) -> AppResult<()>;

    async fn send_subscription_email(
        &self,
        to: &str,
        email: &SubscriptionEmail,
        mode: DeliveryMode,
    ) -> AppResult<()>;
}
