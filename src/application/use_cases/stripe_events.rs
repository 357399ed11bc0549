use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::{
        delivery_mode::DeliveryMode,
        stripe_event::{StripeCharge, StripeEvent, StripeInvoice},
        webhook_event::{Admission, StripeEventType},
    },
    use_cases::{payment_failures::PaymentFailureUseCases, webhook_ledger::WebhookLedger},
};

pub struct StripeEventSettings {
    /// Drop test-mode events without touching state.
    pub block_test_events: bool,
}

/// How an inbound event was disposed of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed { event_type: String },
    Ignored { event_type: String },
    TestModeBlocked,
    Duplicate,
    InProgress,
    PermanentlyFailed,
    /// Handler failed; the ledger entry is marked failed for retry.
    Failed { event_type: String, message: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// Admits, dispatches and records inbound Stripe events.
pub struct StripeEventUseCases {
    ledger: Arc<WebhookLedger>,
    payment_failures: Arc<PaymentFailureUseCases>,
    settings: StripeEventSettings,
}

impl StripeEventUseCases {
    pub fn new(
        ledger: Arc<WebhookLedger>,
        payment_failures: Arc<PaymentFailureUseCases>,
        settings: StripeEventSettings,
    ) -> Self {
        Self {
            ledger,
            payment_failures,
            settings,
        }
    }

    /// Processes a verified event payload. Errors are only returned for
    /// malformed payloads or when the ledger cannot admit the event. Handler
    /// errors become [`WebhookOutcome::Failed`]. Once the event is admitted,
    /// a failed ledger status write is logged and the outcome still returned.
    pub async fn process_payload(
        &self,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> AppResult<WebhookOutcome> {
        let event: StripeEvent = serde_json::from_value(payload.clone())
            .map_err(|e| AppError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;

        if !event.livemode && self.settings.block_test_events {
            info!(event_id = %event.id, event_type = %event.event_type, "Blocking test-mode event");
            return Ok(WebhookOutcome::TestModeBlocked);
        }

        match self
            .ledger
            .admit(&event.id, &event.event_type, &payload, now)
            .await?
        {
            Admission::Admitted { .. } => {}
            Admission::AlreadyProcessed => return Ok(WebhookOutcome::Duplicate),
            Admission::InProgress => return Ok(WebhookOutcome::InProgress),
            Admission::PermanentlyFailed => {
                warn!(event_id = %event.id, "Event permanently failed, not retrying");
                return Ok(WebhookOutcome::PermanentlyFailed);
            }
        }

        let Ok(kind) = event.event_type.parse::<StripeEventType>() else {
            info!(event_id = %event.id, event_type = %event.event_type, "Unhandled event type");
            log_ledger_write(
                self.ledger.mark_skipped(&event.id, now).await,
                &event.id,
                "skipped",
            );
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event_type,
            });
        };

        let mode = DeliveryMode::from_livemode(event.livemode);

        match self.dispatch(kind, &event, mode, now).await {
            Ok(()) => {
                log_ledger_write(
                    self.ledger.mark_processed(&event.id, now).await,
                    &event.id,
                    "processed",
                );
                Ok(WebhookOutcome::Processed {
                    event_type: event.event_type,
                })
            }
            Err(e) => {
                error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    error = %e,
                    "Webhook handler failed"
                );
                log_ledger_write(
                    self.ledger.mark_failed(&event.id, &e, now).await,
                    &event.id,
                    "failed",
                );
                Ok(WebhookOutcome::Failed {
                    event_type: event.event_type,
                    message: e.to_string(),
                })
            }
        }
    }

    async fn dispatch(
        &self,
        kind: StripeEventType,
        event: &StripeEvent,
        mode: DeliveryMode,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        match kind {
            StripeEventType::InvoicePaymentFailed => {
                let invoice = parse_object::<StripeInvoice>(event)?;
                let outcome = self
                    .payment_failures
                    .handle_payment_failed(&invoice, mode, now)
                    .await?;
                info!(event_id = %event.id, ?outcome, "Handled invoice.payment_failed");
            }
            StripeEventType::InvoicePaid | StripeEventType::InvoicePaymentSucceeded => {
                let invoice = parse_object::<StripeInvoice>(event)?;
                let outcome = self
                    .payment_failures
                    .handle_payment_succeeded(&invoice, mode, now)
                    .await?;
                info!(event_id = %event.id, event_type = %event.event_type, ?outcome, "Handled invoice payment");
            }
            StripeEventType::ChargeFailed => {
                let charge = parse_object::<StripeCharge>(event)?;
                self.payment_failures.handle_charge_failed(&charge).await?;
            }
        }
        Ok(())
    }

    /// Re-runs failed events that are due for another attempt.
    pub async fn retry_failed(&self, now: DateTime<Utc>) -> AppResult<RetryReport> {
        let mut report = RetryReport::default();

        for record in self.ledger.list_retryable(now).await? {
            report.attempted += 1;
            info!(
                event_id = %record.provider_event_id,
                event_type = %record.event_type,
                retry_count = record.retry_count,
                "Retrying failed webhook event"
            );

            match self.process_payload(record.payload, now).await {
                Ok(WebhookOutcome::Processed { .. }) | Ok(WebhookOutcome::Ignored { .. }) => {
                    report.succeeded += 1
                }
                Ok(outcome) => {
                    warn!(event_id = %record.provider_event_id, ?outcome, "Webhook retry did not succeed");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(event_id = %record.provider_event_id, error = %e, "Webhook retry errored");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        self.ledger.purge_expired(now).await
    }
}

fn log_ledger_write(result: AppResult<()>, event_id: &str, status: &'static str) {
    if let Err(e) = result {
        error!(event_id, status, error = %e, "Failed to record webhook event status");
    }
}

fn parse_object<T: serde::de::DeserializeOwned>(event: &StripeEvent) -> AppResult<T> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        AppError::InvalidInput(format!(
            "Invalid {} object in event {}: {}",
            event.event_type, event.id, e
        ))
    })
}
