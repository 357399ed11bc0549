use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::resource_archiver::ResourceRepoTrait,
    domain::entities::resource::{ResourceItem, ResourceKind},
};

// Table names come from `ResourceKind::table_name`, never from input.

fn row_to_item(kind: ResourceKind, row: sqlx::postgres::PgRow) -> ResourceItem {
    ResourceItem {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind,
        name: row.get("name"),
        archived: row.get("archived"),
        archived_at: row.get("archived_at"),
        archived_reason: row.get("archived_reason"),
        created_at: row.get("created_at"),
    }
}

const SELECT_COLS: &str = "id, user_id, name, archived, archived_at, archived_reason, created_at";

#[async_trait]
impl ResourceRepoTrait for PostgresPersistence {
    async fn list_active(&self, user_id: Uuid, kind: ResourceKind) -> AppResult<Vec<ResourceItem>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM {}
            WHERE user_id = $1 AND archived = false
            ORDER BY created_at ASC, id ASC
            "#,
            SELECT_COLS,
            kind.table_name()
        ))
        .bind(user_id)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rows.into_iter().map(|row| row_to_item(kind, row)).collect())
    }

    async fn count_active(&self, user_id: Uuid, kind: ResourceKind) -> AppResult<i64> {
        let row = sqlx::query(&format!(
            "SELECT COUNT(*) AS count FROM {} WHERE user_id = $1 AND archived = false",
            kind.table_name()
        ))
        .bind(user_id)
        .fetch_one(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.get("count"))
    }

    async fn archive(
        &self,
        kind: ResourceKind,
        ids: &[Uuid],
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(&format!(
            r#"
            UPDATE {}
            SET archived = true, archived_at = $2, archived_reason = $3
            WHERE id = ANY($1) AND archived = false
            "#,
            kind.table_name()
        ))
        .bind(ids)
        .bind(now)
        .bind(reason)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(result.rows_affected())
    }
}
