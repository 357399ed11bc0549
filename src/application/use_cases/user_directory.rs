use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::{app_error::AppResult, domain::entities::plan::Plan};

#[derive(Debug, Clone)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub premium_suspended: bool,
    pub premium_suspended_at: Option<DateTime<Utc>>,
    pub subscription_plan: Plan,
}

/// The slice of the platform's user table this service reads and writes.
#[async_trait]
pub trait UserRepoTrait: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<UserProfile>>;

    async fn set_premium_suspended(
        &self,
        id: Uuid,
        suspended: bool,
        now: DateTime<Utc>,
    ) -> AppResult<()>;

    async fn set_subscription_plan(&self, id: Uuid, plan: Plan) -> AppResult<()>;
}

/// Looks up the notification recipient. Lookup failures are logged, not raised.
pub async fn find_recipient(users: &dyn UserRepoTrait, user_id: Uuid) -> Option<UserProfile> {
    match users.get_by_id(user_id).await {
        Ok(Some(user)) => Some(user),
        Ok(None) => {
            warn!(user_id = %user_id, "No user found for billing record, skipping email");
            None
        }
        Err(e) => {
            warn!(user_id = %user_id, error = %e, "User lookup failed, skipping email");
            None
        }
    }
}
