use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// A `processing` entry younger than this is assumed to still be running.
pub const PROCESSING_TIMEOUT_SECS: i64 = 30;
/// Failed entries with this many attempts are never re-admitted.
pub const MAX_RETRIES: i32 = 3;
/// Ledger entries older than this are purged.
pub const RETENTION_DAYS: i64 = 90;
/// Minimum gap between two retry-worker attempts on the same entry.
pub const RETRY_COOLDOWN_MINS: i64 = 60;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    Display,
    EnumString,
    Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum WebhookEventStatus {
    #[default]
    Processing,
    Processed,
    Failed,
    Skipped,
}

/// Stripe event types this service acts on. Everything else is recorded as skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumString)]
pub enum StripeEventType {
    #[strum(serialize = "invoice.payment_failed")]
    InvoicePaymentFailed,
    #[strum(serialize = "invoice.payment_succeeded")]
    InvoicePaymentSucceeded,
    #[strum(serialize = "invoice.paid")]
    InvoicePaid,
    #[strum(serialize = "charge.failed")]
    ChargeFailed,
}

impl StripeEventType {
    pub const ALL: [StripeEventType; 4] = [
        StripeEventType::InvoicePaymentFailed,
        StripeEventType::InvoicePaymentSucceeded,
        StripeEventType::InvoicePaid,
        StripeEventType::ChargeFailed,
    ];

    pub fn is_payment_success(&self) -> bool {
        matches!(
            self,
            StripeEventType::InvoicePaid | StripeEventType::InvoicePaymentSucceeded
        )
    }
}

/// Lookup keys extracted from the event payload for debugging and filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEventMetadata {
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub invoice_id: Option<String>,
}

impl WebhookEventMetadata {
    pub fn from_payload(event_type: &str, payload: &serde_json::Value) -> Self {
        let object = &payload["data"]["object"];
        let text = |v: &serde_json::Value| v.as_str().map(str::to_string);

        Self {
            customer_id: text(&object["customer"]),
            subscription_id: text(&object["subscription"]),
            invoice_id: if event_type.contains("invoice") {
                text(&object["id"])
            } else {
                None
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEventError {
    pub message: String,
    pub code: String,
}

/// Idempotency ledger entry, keyed by the provider's event id.
#[derive(Debug, Clone)]
pub struct WebhookEventRecord {
    pub id: Uuid,
    pub provider_event_id: String,
    pub event_type: String,
    pub status: WebhookEventStatus,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub processing_started_at: DateTime<Utc>,
    pub payload: serde_json::Value,
    pub metadata: WebhookEventMetadata,
    pub error: Option<WebhookEventError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of presenting an event to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The caller owns this delivery and must run the handler.
    Admitted { retry_count: i32 },
    AlreadyProcessed,
    InProgress,
    PermanentlyFailed,
}

/// What to do with an event id that already has a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReclaimDecision {
    Reclaim { bump_retry: bool },
    Reject(Admission),
}

impl WebhookEventRecord {
    pub fn reclaim_decision(&self, now: DateTime<Utc>) -> ReclaimDecision {
        match self.status {
            WebhookEventStatus::Processed | WebhookEventStatus::Skipped => {
                ReclaimDecision::Reject(Admission::AlreadyProcessed)
            }
            WebhookEventStatus::Failed if self.retry_count >= MAX_RETRIES => {
                ReclaimDecision::Reject(Admission::PermanentlyFailed)
            }
            WebhookEventStatus::Failed => ReclaimDecision::Reclaim { bump_retry: false },
            WebhookEventStatus::Processing => {
                if now - self.processing_started_at < stale_processing_after() {
                    ReclaimDecision::Reject(Admission::InProgress)
                } else {
                    ReclaimDecision::Reclaim { bump_retry: true }
                }
            }
        }
    }

    pub fn is_permanently_failed(&self) -> bool {
        self.status == WebhookEventStatus::Failed && self.retry_count >= MAX_RETRIES
    }
}

pub fn stale_processing_after() -> Duration {
    Duration::seconds(PROCESSING_TIMEOUT_SECS)
}
