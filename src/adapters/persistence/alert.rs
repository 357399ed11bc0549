use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::alerts::AlertRepoTrait,
    domain::entities::alert::NewAlert,
};

#[async_trait]
impl AlertRepoTrait for PostgresPersistence {
    async fn create(&self, alert: &NewAlert, now: DateTime<Utc>) -> AppResult<Uuid> {
        let row = sqlx::query(
            r#"
            INSERT INTO alerts
                (id, user_id, level, title, message, icon, action_text, route, read, created_at)
            VALUES (gen_random_uuid(), $1, $2, $3, $4, $5, $6, $7, false, $8)
            RETURNING id
            "#,
        )
        .bind(alert.user_id)
        .bind(alert.level.as_ref())
        .bind(&alert.title)
        .bind(&alert.message)
        .bind(&alert.icon)
        .bind(&alert.action_text)
        .bind(&alert.route)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.try_get("id")?)
    }
}
