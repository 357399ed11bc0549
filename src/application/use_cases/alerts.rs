use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{app_error::AppResult, domain::entities::alert::NewAlert};

/// Writes in-app alerts. The platform owns reading and dismissing them.
#[async_trait]
pub trait AlertRepoTrait: Send + Sync {
    async fn create(&self, alert: &NewAlert, now: DateTime<Utc>) -> AppResult<Uuid>;
}
