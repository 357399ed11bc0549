use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::webhook_event::{
        Admission, RETENTION_DAYS, RETRY_COOLDOWN_MINS, ReclaimDecision, WebhookEventError,
        WebhookEventMetadata, WebhookEventRecord,
    },
};

/// Retry worker batch size.
pub const RETRY_BATCH_SIZE: i64 = 10;

#[derive(Debug, Clone)]
pub struct NewWebhookEvent<'a> {
    pub provider_event_id: &'a str,
    pub event_type: &'a str,
    pub payload: &'a serde_json::Value,
    pub metadata: WebhookEventMetadata,
}

#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// Row inserted, or an existing row reclaimed; the caller owns the event.
    Claimed(WebhookEventRecord),
    /// Row exists and was left untouched.
    Existing(WebhookEventRecord),
}

#[async_trait]
pub trait WebhookEventRepoTrait: Send + Sync {
    /// Inserts a `processing` row, or atomically reclaims an existing row when
    /// [`WebhookEventRecord::reclaim_decision`] allows it. Reclaiming a stale
    /// `processing` row increments `retry_count`.
    async fn claim(&self, event: &NewWebhookEvent<'_>, now: DateTime<Utc>) -> AppResult<ClaimOutcome>;

    async fn get_by_provider_id(&self, provider_event_id: &str) -> AppResult<Option<WebhookEventRecord>>;

    async fn mark_processed(&self, provider_event_id: &str, now: DateTime<Utc>) -> AppResult<()>;

    /// Sets `failed`, increments `retry_count`, stamps `last_retry_at`.
    async fn mark_failed(
        &self,
        provider_event_id: &str,
        error: &WebhookEventError,
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn mark_skipped(&self, provider_event_id: &str, now: DateTime<Utc>) -> AppResult<()>;

    /// Failed rows under the retry cap whose last attempt is before `retry_before`.
    async fn list_retryable(
        &self,
        retry_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<WebhookEventRecord>>;

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}

/// Idempotency ledger for inbound provider events.
pub struct WebhookLedger {
    repo: Arc<dyn WebhookEventRepoTrait>,
}

impl WebhookLedger {
    pub fn new(repo: Arc<dyn WebhookEventRepoTrait>) -> Self {
        Self { repo }
    }

    pub async fn admit(
        &self,
        provider_event_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> AppResult<Admission> {
        if provider_event_id.is_empty() {
            return Err(AppError::InvalidInput("Event id is required".into()));
        }

        let event = NewWebhookEvent {
            provider_event_id,
            event_type,
            payload,
            metadata: WebhookEventMetadata::from_payload(event_type, payload),
        };

        match self.repo.claim(&event, now).await? {
            ClaimOutcome::Claimed(record) => {
                if record.retry_count > 0 {
                    info!(
                        event_id = provider_event_id,
                        event_type,
                        retry_count = record.retry_count,
                        "Re-admitting webhook event"
                    );
                }
                Ok(Admission::Admitted {
                    retry_count: record.retry_count,
                })
            }
            ClaimOutcome::Existing(record) => {
                let admission = match record.reclaim_decision(now) {
                    ReclaimDecision::Reject(admission) => admission,
                    // Reclaimable by now, but another delivery won the claim.
                    ReclaimDecision::Reclaim { .. } => Admission::InProgress,
                };
                debug!(
                    event_id = provider_event_id,
                    status = %record.status,
                    retry_count = record.retry_count,
                    ?admission,
                    "Webhook event already in ledger"
                );
                Ok(admission)
            }
        }
    }

    pub async fn mark_processed(&self, provider_event_id: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.repo.mark_processed(provider_event_id, now).await
    }

    pub async fn mark_failed(
        &self,
        provider_event_id: &str,
        error: &AppError,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let detail = WebhookEventError {
            message: error.to_string(),
            code: error.code().as_str().to_string(),
        };
        warn!(
            event_id = provider_event_id,
            error = %error,
            "Marking webhook event as failed"
        );
        self.repo.mark_failed(provider_event_id, &detail, now).await
    }

    pub async fn mark_skipped(&self, provider_event_id: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.repo.mark_skipped(provider_event_id, now).await
    }

    pub async fn get(&self, provider_event_id: &str) -> AppResult<Option<WebhookEventRecord>> {
        self.repo.get_by_provider_id(provider_event_id).await
    }

    /// Failed events due for another attempt.
    pub async fn list_retryable(&self, now: DateTime<Utc>) -> AppResult<Vec<WebhookEventRecord>> {
        let retry_before = now - Duration::minutes(RETRY_COOLDOWN_MINS);
        self.repo.list_retryable(retry_before, RETRY_BATCH_SIZE).await
    }

    pub async fn purge_expired(&self, now: DateTime<Utc>) -> AppResult<u64> {
        let cutoff = now - Duration::days(RETENTION_DAYS);
        let deleted = self.repo.delete_created_before(cutoff).await?;
        if deleted > 0 {
            info!(deleted, "Purged expired webhook events");
        }
        Ok(deleted)
    }
}
