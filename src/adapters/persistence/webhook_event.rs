use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, postgres::PgRow};

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback, to_json},
    app_error::{AppError, AppResult},
    application::use_cases::webhook_ledger::{ClaimOutcome, NewWebhookEvent, WebhookEventRepoTrait},
    domain::entities::webhook_event::{
        MAX_RETRIES, WebhookEventError, WebhookEventRecord, stale_processing_after,
    },
};

fn row_to_record(row: PgRow) -> AppResult<WebhookEventRecord> {
    let provider_event_id: String = row.try_get("provider_event_id")?;
    let metadata: Option<serde_json::Value> = row.try_get("metadata")?;
    let error: Option<serde_json::Value> = row.try_get("error")?;
    let status: String = row.try_get("status")?;

    Ok(WebhookEventRecord {
        id: row.try_get("id")?,
        event_type: row.try_get("event_type")?,
        status: status.parse().unwrap_or_default(),
        retry_count: row.try_get("retry_count")?,
        last_retry_at: row.try_get("last_retry_at")?,
        processing_started_at: row.try_get("processing_started_at")?,
        payload: row.try_get("payload")?,
        metadata: parse_json_with_fallback(
            &metadata.unwrap_or_default(),
            "metadata",
            "webhook_event",
            &provider_event_id,
        ),
        error: error.map(|e| parse_json_with_fallback(&e, "error", "webhook_event", &provider_event_id)),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        provider_event_id,
    })
}

const SELECT_COLS: &str = "id, provider_event_id, event_type, status, retry_count, last_retry_at, \
    processing_started_at, payload, metadata, error, created_at, updated_at";

#[async_trait]
impl WebhookEventRepoTrait for PostgresPersistence {
    async fn claim(&self, event: &NewWebhookEvent<'_>, now: DateTime<Utc>) -> AppResult<ClaimOutcome> {
        // Insert, or take over a row that is failed-but-retryable or stuck in
        // processing. The unique key makes concurrent deliveries race on the row
        // lock, so exactly one of them gets a row back.
        let claimed = sqlx::query(&format!(
            r#"
            INSERT INTO webhook_events
                (id, provider_event_id, event_type, status, retry_count,
                 processing_started_at, payload, metadata, created_at, updated_at)
            VALUES (gen_random_uuid(), $1, $2, 'processing', 0, $3, $4, $5, $3, $3)
            ON CONFLICT (provider_event_id) DO UPDATE SET
                status = 'processing',
                processing_started_at = $3,
                retry_count = webhook_events.retry_count
                    + CASE WHEN webhook_events.status = 'processing' THEN 1 ELSE 0 END,
                updated_at = $3
            WHERE (webhook_events.status = 'failed' AND webhook_events.retry_count < $6)
               OR (webhook_events.status = 'processing' AND webhook_events.processing_started_at <= $7)
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(event.provider_event_id)
        .bind(event.event_type)
        .bind(now)
        .bind(event.payload)
        .bind(to_json(&event.metadata)?)
        .bind(MAX_RETRIES)
        .bind(now - stale_processing_after())
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        if let Some(row) = claimed {
            return row_to_record(row).map(ClaimOutcome::Claimed);
        }

        self.get_by_provider_id(event.provider_event_id)
            .await?
            .map(ClaimOutcome::Existing)
            .ok_or_else(|| AppError::Internal("Webhook event vanished during claim".into()))
    }

    async fn get_by_provider_id(&self, provider_event_id: &str) -> AppResult<Option<WebhookEventRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM webhook_events WHERE provider_event_id = $1",
            SELECT_COLS
        ))
        .bind(provider_event_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        row.map(row_to_record).transpose()
    }

    async fn mark_processed(&self, provider_event_id: &str, now: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'processed', error = NULL, updated_at = $2
            WHERE provider_event_id = $1
            "#,
        )
        .bind(provider_event_id)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn mark_failed(
        &self,
        provider_event_id: &str,
        error: &WebhookEventError,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE webhook_events
            SET status = 'failed',
                retry_count = retry_count + 1,
                last_retry_at = $2,
                error = $3,
                updated_at = $2
            WHERE provider_event_id = $1
            "#,
        )
        .bind(provider_event_id)
        .bind(now)
        .bind(to_json(error)?)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn mark_skipped(&self, provider_event_id: &str, now: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            "UPDATE webhook_events SET status = 'skipped', updated_at = $2 WHERE provider_event_id = $1",
        )
        .bind(provider_event_id)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn list_retryable(
        &self,
        retry_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<WebhookEventRecord>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM webhook_events
            WHERE status = 'failed'
              AND retry_count < $1
              AND (last_retry_at IS NULL OR last_retry_at < $2)
            ORDER BY created_at ASC
            LIMIT $3
            "#,
            SELECT_COLS
        ))
        .bind(MAX_RETRIES)
        .bind(retry_before)
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        rows.into_iter().map(row_to_record).collect()
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM webhook_events WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.pool())
            .await
            .map_err(AppError::from)?;

        Ok(result.rows_affected())
    }
}
