use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    domain::entities::plan::Plan,
    use_cases::user_directory::{UserProfile, UserRepoTrait},
};

// User row as stored in the db.
#[derive(sqlx::FromRow, Debug)]
pub struct UserDb {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub premium_suspended: bool,
    pub premium_suspended_at: Option<DateTime<Utc>>,
    pub subscription_plan: String,
}

impl From<UserDb> for UserProfile {
    fn from(rec: UserDb) -> Self {
        UserProfile {
            id: rec.id,
            email: rec.email,
            display_name: rec.display_name,
            premium_suspended: rec.premium_suspended,
            premium_suspended_at: rec.premium_suspended_at,
            subscription_plan: rec.subscription_plan.parse().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl UserRepoTrait for PostgresPersistence {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<UserProfile>> {
        let rec = sqlx::query_as::<_, UserDb>(
            r#"
            SELECT id, email, display_name, premium_suspended, premium_suspended_at, subscription_plan
            FROM users WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(rec.map(UserProfile::from))
    }

    async fn set_premium_suspended(
        &self,
        id: Uuid,
        suspended: bool,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET premium_suspended = $2,
                premium_suspended_at = CASE WHEN $2 THEN $3 ELSE NULL END,
                updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(suspended)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn set_subscription_plan(&self, id: Uuid, plan: Plan) -> AppResult<()> {
        sqlx::query("UPDATE users SET subscription_plan = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(plan.as_ref())
            .execute(self.pool())
            .await
            .map_err(AppError::from)?;
        Ok(())
    }
}
