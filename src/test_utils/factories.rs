//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use crate::{
    application::use_cases::user_directory::UserProfile,
    domain::entities::{
        account_status::AccountStatus,
        billing_record::{BillingRecord, PaymentFailures, PaymentRecovery},
        plan::{Plan, features_for, limits_for},
        resource::{ResourceItem, ResourceKind},
        stripe_event::StripeInvoice,
        subscription_status::SubscriptionStatus,
        webhook_event::{WebhookEventMetadata, WebhookEventRecord, WebhookEventStatus},
    },
};

/// Create a billing record on an active standard subscription.
pub fn create_test_billing_record(overrides: impl FnOnce(&mut BillingRecord)) -> BillingRecord {
    let now = test_datetime();
    let mut record = BillingRecord {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        stripe_customer_id: "cus_123".to_string(),
        stripe_subscription_id: format!("sub_{}", Uuid::new_v4().simple()),
        stripe_price_id: Some("price_standard".to_string()),
        plan: Plan::Standard,
        status: SubscriptionStatus::Active,
        account_status: AccountStatus::Active,
        payment_failures: PaymentFailures::default(),
        payment_recovery: PaymentRecovery::default(),
        downgrade_grace_period: None,
        status_history: Vec::new(),
        limits: limits_for(Plan::Standard),
        features: features_for(Plan::Standard),
        version: 0,
        created_at: now,
        updated_at: now,
    };
    overrides(&mut record);
    record
}

/// Create a user profile with sensible defaults.
pub fn create_test_user(overrides: impl FnOnce(&mut UserProfile)) -> UserProfile {
    let mut user = UserProfile {
        id: Uuid::new_v4(),
        email: "user@example.com".to_string(),
        display_name: Some("Test User".to_string()),
        premium_suspended: false,
        premium_suspended_at: None,
        subscription_plan: Plan::Premium,
    };
    overrides(&mut user);
    user
}

/// Create a declined invoice for `subscription_id`.
pub fn create_test_invoice(
    subscription_id: &str,
    overrides: impl FnOnce(&mut StripeInvoice),
) -> StripeInvoice {
    let next_attempt = (Utc::now() + Duration::days(3)).timestamp();
    let mut invoice: StripeInvoice = serde_json::from_value(json!({
        "id": format!("in_{}", Uuid::new_v4().simple()),
        "customer": "cus_123",
        "subscription": subscription_id,
        "amount_due": 1999,
        "amount_paid": 0,
        "currency": "usd",
        "attempt_count": 1,
        "next_payment_attempt": next_attempt,
        "last_payment_error": {
            "code": "card_declined",
            "decline_code": "generic_decline",
            "message": "Your card was declined."
        }
    }))
    .expect("invoice fixture should deserialize");
    overrides(&mut invoice);
    invoice
}

/// Create `count` active items of `kind`, oldest first, one minute apart.
pub fn create_test_resources(user_id: Uuid, kind: ResourceKind, count: usize) -> Vec<ResourceItem> {
    let start = test_datetime() - Duration::days(30);
    (0..count)
        .map(|i| ResourceItem {
            id: Uuid::new_v4(),
            user_id,
            kind,
            name: format!("{} {}", kind, i + 1),
            archived: false,
            archived_at: None,
            archived_reason: None,
            created_at: start + Duration::minutes(i as i64),
        })
        .collect()
}

/// Create a processed ledger entry.
pub fn create_test_webhook_event(
    overrides: impl FnOnce(&mut WebhookEventRecord),
) -> WebhookEventRecord {
    let now = Utc::now();
    let mut event = WebhookEventRecord {
        id: Uuid::new_v4(),
        provider_event_id: format!("evt_{}", Uuid::new_v4().simple()),
        event_type: "invoice.payment_failed".to_string(),
        status: WebhookEventStatus::Processed,
        retry_count: 0,
        last_retry_at: None,
        processing_started_at: now,
        payload: json!({}),
        metadata: WebhookEventMetadata::default(),
        error: None,
        created_at: now,
        updated_at: now,
    };
    overrides(&mut event);
    event
}

/// A Stripe event envelope around a declined invoice.
pub fn invoice_event(
    event_id: &str,
    event_type: &str,
    subscription_id: &str,
    livemode: bool,
) -> serde_json::Value {
    json!({
        "id": event_id,
        "type": event_type,
        "livemode": livemode,
        "data": {
            "object": {
                "id": format!("in_{}", event_id),
                "customer": "cus_123",
                "subscription": subscription_id,
                "amount_due": 4999,
                "currency": "usd",
                "last_payment_error": { "message": "Your card was declined." }
            }
        }
    })
}

/// Builds a `Stripe-Signature` header value for `payload`.
pub fn sign_payload(payload: &str, secret: &str, timestamp: i64) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

/// Creation time for fixtures; well before any test's `now`.
pub fn test_datetime() -> DateTime<Utc> {
    Utc::now() - Duration::days(60)
}
