//! Typed views over the parts of Stripe event payloads this service reads.

use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default = "default_livemode")]
    pub livemode: bool,
    pub data: StripeEventData,
}

fn default_livemode() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentError {
    pub code: Option<String>,
    pub decline_code: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionDetails {
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvoiceParent {
    pub subscription_details: Option<SubscriptionDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub customer: Option<String>,
    subscription: Option<String>,
    #[serde(default)]
    parent: Option<InvoiceParent>,
    #[serde(default)]
    pub amount_due: i64,
    #[serde(default)]
    pub amount_paid: i64,
    #[serde(default)]
    pub currency: String,
    pub attempt_count: Option<i64>,
    pub next_payment_attempt: Option<i64>,
    pub last_payment_error: Option<PaymentError>,
}

impl StripeInvoice {
    /// Subscription id, accepting both the legacy top-level field and the
    /// newer `parent.subscription_details` location.
    pub fn subscription_id(&self) -> Option<&str> {
        self.subscription.as_deref().or_else(|| {
            self.parent
                .as_ref()
                .and_then(|p| p.subscription_details.as_ref())
                .and_then(|d| d.subscription.as_deref())
        })
    }

    pub fn failure_reason(&self) -> String {
        self.last_payment_error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn failure_code(&self) -> Option<String> {
        self.last_payment_error
            .as_ref()
            .and_then(|e| e.decline_code.clone().or_else(|| e.code.clone()))
    }

    pub fn next_retry_at(&self) -> Option<DateTime<Utc>> {
        self.next_payment_attempt
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    pub customer: Option<String>,
    pub invoice: Option<String>,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: String,
    pub failure_code: Option<String>,
    pub failure_message: Option<String>,
}
