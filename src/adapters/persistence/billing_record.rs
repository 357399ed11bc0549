use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback, to_json},
    app_error::{AppError, AppResult},
    application::use_cases::billing_record::BillingRecordRepoTrait,
    domain::entities::billing_record::BillingRecord,
};

fn row_to_record(row: PgRow) -> AppResult<BillingRecord> {
    let id: Uuid = row.try_get("id")?;
    let entity_id = id.to_string();
    // Nullable JSONB decodes as `Value::Null`, which the parser maps to the default.
    let json = |column: &str| -> AppResult<serde_json::Value> {
        let value: Option<serde_json::Value> = row.try_get(column)?;
        Ok(value.unwrap_or_default())
    };
    let parsed = |column: &str| -> AppResult<String> { Ok(row.try_get(column)?) };

    Ok(BillingRecord {
        id,
        user_id: row.try_get("user_id")?,
        stripe_customer_id: row.try_get("stripe_customer_id")?,
        stripe_subscription_id: row.try_get("stripe_subscription_id")?,
        stripe_price_id: row.try_get("stripe_price_id")?,
        plan: parsed("plan")?.parse().unwrap_or_default(),
        status: parsed("status")?.parse().unwrap_or_default(),
        account_status: parsed("account_status")?.parse().unwrap_or_default(),
        payment_failures: parse_json_with_fallback(
            &json("payment_failures")?,
            "payment_failures",
            "billing_record",
            &entity_id,
        ),
        payment_recovery: parse_json_with_fallback(
            &json("payment_recovery")?,
            "payment_recovery",
            "billing_record",
            &entity_id,
        ),
        downgrade_grace_period: parse_json_with_fallback(
            &json("downgrade_grace_period")?,
            "downgrade_grace_period",
            "billing_record",
            &entity_id,
        ),
        status_history: parse_json_with_fallback(
            &json("status_history")?,
            "status_history",
            "billing_record",
            &entity_id,
        ),
        limits: parse_json_with_fallback(&json("limits")?, "limits", "billing_record", &entity_id),
        features: parse_json_with_fallback(&json("features")?, "features", "billing_record", &entity_id),
        version: row.try_get("version")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

const SELECT_COLS: &str = "id, user_id, stripe_customer_id, stripe_subscription_id, stripe_price_id, \
    plan, status, account_status, payment_failures, payment_recovery, downgrade_grace_period, \
    status_history, limits, features, version, created_at, updated_at";

// JSONB accessors shared by the sweeper queries.
const GRACE_SCHEDULED: &str = "(downgrade_grace_period->>'autoArchiveScheduled')::boolean";
const GRACE_EXPIRES_AT: &str = "(downgrade_grace_period->>'expiresAt')::timestamptz";

impl PostgresPersistence {
    async fn fetch_records(
        &self,
        sql: &str,
        binds: &[DateTime<Utc>],
    ) -> AppResult<Vec<BillingRecord>> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = query.bind(*bind);
        }
        let rows = query
            .fetch_all(self.pool())
            .await
            .map_err(AppError::from)?;
        rows.into_iter().map(row_to_record).collect()
    }
}

#[async_trait]
impl BillingRecordRepoTrait for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<BillingRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM billing_records WHERE id = $1",
            SELECT_COLS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        row.map(row_to_record).transpose()
    }

    async fn get_by_subscription_id(&self, subscription_id: &str) -> AppResult<Option<BillingRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM billing_records WHERE stripe_subscription_id = $1",
            SELECT_COLS
        ))
        .bind(subscription_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        row.map(row_to_record).transpose()
    }

    async fn get_by_customer_id(&self, customer_id: &str) -> AppResult<Option<BillingRecord>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM billing_records
            WHERE stripe_customer_id = $1
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
            SELECT_COLS
        ))
        .bind(customer_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        row.map(row_to_record).transpose()
    }

    async fn save(&self, record: &BillingRecord) -> AppResult<BillingRecord> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE billing_records SET
                stripe_price_id = $3,
                plan = $4,
                status = $5,
                account_status = $6,
                payment_failures = $7,
                payment_recovery = $8,
                downgrade_grace_period = $9,
                status_history = $10,
                limits = $11,
                features = $12,
                version = version + 1,
                updated_at = $13
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(record.id)
        .bind(record.version)
        .bind(&record.stripe_price_id)
        .bind(record.plan.as_ref())
        .bind(record.status.as_ref())
        .bind(record.account_status.as_ref())
        .bind(to_json(&record.payment_failures)?)
        .bind(to_json(&record.payment_recovery)?)
        .bind(to_json(&record.downgrade_grace_period)?)
        .bind(to_json(&record.status_history)?)
        .bind(to_json(&record.limits)?)
        .bind(to_json(&record.features)?)
        .bind(record.updated_at)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        match row {
            Some(row) => row_to_record(row),
            None => Err(AppError::Conflict(format!(
                "billing record {} changed since version {}",
                record.id, record.version
            ))),
        }
    }

    async fn list_expired_grace_periods(&self, now: DateTime<Utc>) -> AppResult<Vec<BillingRecord>> {
        self.fetch_records(
            &format!(
                r#"
                SELECT {} FROM billing_records
                WHERE {} = true AND {} < $1
                ORDER BY {} ASC
                "#,
                SELECT_COLS, GRACE_SCHEDULED, GRACE_EXPIRES_AT, GRACE_EXPIRES_AT
            ),
            &[now],
        )
        .await
    }

    async fn list_expired_payment_grace(
        &self,
        first_failed_before: DateTime<Utc>,
    ) -> AppResult<Vec<BillingRecord>> {
        self.fetch_records(
            &format!(
                r#"
                SELECT {} FROM billing_records
                WHERE account_status = 'grace_period'
                  AND (payment_failures->>'count')::int >= 4
                  AND (payment_failures->>'firstFailedAt')::timestamptz <= $1
                ORDER BY created_at ASC
                "#,
                SELECT_COLS
            ),
            &[first_failed_before],
        )
        .await
    }

    async fn list_grace_periods_expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<BillingRecord>> {
        self.fetch_records(
            &format!(
                r#"
                SELECT {} FROM billing_records
                WHERE {} = true AND {} BETWEEN $1 AND $2
                ORDER BY {} ASC
                "#,
                SELECT_COLS, GRACE_SCHEDULED, GRACE_EXPIRES_AT, GRACE_EXPIRES_AT
            ),
            &[from, to],
        )
        .await
    }

    async fn clear_stale_grace_periods(
        &self,
        expired_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE billing_records
            SET downgrade_grace_period = 'null'::jsonb, version = version + 1, updated_at = $2
            WHERE downgrade_grace_period IS NOT NULL
              AND jsonb_typeof(downgrade_grace_period) = 'object'
              AND COALESCE({}, false) = false
              AND {} < $1
            "#,
            GRACE_SCHEDULED, GRACE_EXPIRES_AT
        ))
        .bind(expired_before)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected())
    }

    async fn clear_stale_notification_flags(
        &self,
        failed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE billing_records
            SET payment_failures = jsonb_set(payment_failures, '{notificationsSent}', '{}'::jsonb),
                version = version + 1,
                updated_at = $2
            WHERE COALESCE((payment_failures->>'count')::int, 0) = 0
              AND (payment_failures->>'lastFailedAt')::timestamptz < $1
              AND jsonb_path_exists(payment_failures, '$.notificationsSent.* ? (@.sent == true)')
            "#,
        )
        .bind(failed_before)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected())
    }
}
