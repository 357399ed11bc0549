use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    app_error::AppResult,
    domain::entities::{
        plan::PlanLimits,
        resource::{AUTO_ARCHIVE_REASON, ResourceCounts, ResourceItem, ResourceKind},
    },
};

#[async_trait]
pub trait ResourceRepoTrait: Send + Sync {
    /// Non-archived items of `kind`, oldest first, ties broken by id.
    async fn list_active(&self, user_id: Uuid, kind: ResourceKind) -> AppResult<Vec<ResourceItem>>;

    async fn count_active(&self, user_id: Uuid, kind: ResourceKind) -> AppResult<i64>;

    /// Flags the given items archived. Already archived items are left as is.
    async fn archive(
        &self,
        kind: ResourceKind,
        ids: &[Uuid],
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;
}

/// Brings a user's resources down to a plan's quotas by archiving the oldest
/// items. Never deletes.
pub struct ResourceArchiver {
    repo: Arc<dyn ResourceRepoTrait>,
}

impl ResourceArchiver {
    pub fn new(repo: Arc<dyn ResourceRepoTrait>) -> Self {
        Self { repo }
    }

    /// Archives `count - limit` oldest items of each kind that exceeds `limits`.
    /// Returns how many items of each kind were archived.
    pub async fn archive_excess(
        &self,
        user_id: Uuid,
        limits: &PlanLimits,
        now: DateTime<Utc>,
    ) -> AppResult<ResourceCounts> {
        let mut archived = ResourceCounts::default();

        for kind in ResourceKind::ALL {
            let active = self.repo.list_active(user_id, kind).await?;
            let limit = kind.limit(limits).max(0) as usize;
            if active.len() <= limit {
                continue;
            }

            let excess = active.len() - limit;
            let ids: Vec<Uuid> = active.iter().take(excess).map(|item| item.id).collect();
            let count = self.repo.archive(kind, &ids, AUTO_ARCHIVE_REASON, now).await?;
            archived.set(kind, count as i64);

            info!(
                user_id = %user_id,
                kind = %kind,
                archived = count,
                limit,
                "Archived resources over plan limit"
            );
        }

        Ok(archived)
    }

    pub async fn usage(&self, user_id: Uuid) -> AppResult<ResourceCounts> {
        let mut usage = ResourceCounts::default();
        for kind in ResourceKind::ALL {
            usage.set(kind, self.repo.count_active(user_id, kind).await?);
        }
        Ok(usage)
    }

    /// Items that would be archived if `limits` were enforced now.
    pub async fn excess(&self, user_id: Uuid, limits: &PlanLimits) -> AppResult<ResourceCounts> {
        Ok(self.usage(user_id).await?.excess_over(limits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::plan::{Plan, limits_for};
    use crate::test_utils::{InMemoryResourceRepo, create_test_resources};
    use chrono::Duration;

    #[tokio::test]
    async fn archives_oldest_items_over_limit() {
        let user_id = Uuid::new_v4();
        let folders = create_test_resources(user_id, ResourceKind::Folder, 12);
        let oldest: Vec<Uuid> = folders.iter().take(7).map(|f| f.id).collect();
        let newest: Vec<Uuid> = folders.iter().skip(7).map(|f| f.id).collect();
        let repo = Arc::new(InMemoryResourceRepo::with_items(folders));
        let archiver = ResourceArchiver::new(repo.clone());

        let archived = archiver
            .archive_excess(user_id, &limits_for(Plan::Free), Utc::now())
            .await
            .unwrap();

        assert_eq!(archived.folders, 7);
        assert_eq!(archived.total(), 7);
        for id in oldest {
            let item = repo.get(id).unwrap();
            assert!(item.archived);
            assert_eq!(item.archived_reason.as_deref(), Some(AUTO_ARCHIVE_REASON));
        }
        for id in newest {
            assert!(!repo.get(id).unwrap().archived);
        }
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let user_id = Uuid::new_v4();
        let repo = Arc::new(InMemoryResourceRepo::with_items(create_test_resources(
            user_id,
            ResourceKind::Contact,
            14,
        )));
        let archiver = ResourceArchiver::new(repo);
        let limits = limits_for(Plan::Free);
        let now = Utc::now();

        let first = archiver.archive_excess(user_id, &limits, now).await.unwrap();
        let second = archiver
            .archive_excess(user_id, &limits, now + Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(first.contacts, 4);
        assert_eq!(second, ResourceCounts::default());
    }

    #[tokio::test]
    async fn within_limits_archives_nothing() {
        let user_id = Uuid::new_v4();
        let repo = Arc::new(InMemoryResourceRepo::with_items(create_test_resources(
            user_id,
            ResourceKind::Calculator,
            3,
        )));
        let archiver = ResourceArchiver::new(repo);

        let archived = archiver
            .archive_excess(user_id, &limits_for(Plan::Free), Utc::now())
            .await
            .unwrap();
        assert_eq!(archived.total(), 0);
    }

    #[tokio::test]
    async fn only_touches_the_given_user() {
        let user_id = Uuid::new_v4();
        let other_user = Uuid::new_v4();
        let mut items = create_test_resources(user_id, ResourceKind::Folder, 6);
        items.extend(create_test_resources(other_user, ResourceKind::Folder, 9));
        let repo = Arc::new(InMemoryResourceRepo::with_items(items));
        let archiver = ResourceArchiver::new(repo);

        archiver
            .archive_excess(user_id, &limits_for(Plan::Free), Utc::now())
            .await
            .unwrap();

        assert_eq!(archiver.usage(user_id).await.unwrap().folders, 5);
        assert_eq!(archiver.usage(other_user).await.unwrap().folders, 9);
    }

    #[tokio::test]
    async fn excess_reports_without_archiving() {
        let user_id = Uuid::new_v4();
        let repo = Arc::new(InMemoryResourceRepo::with_items(create_test_resources(
            user_id,
            ResourceKind::Folder,
            8,
        )));
        let archiver = ResourceArchiver::new(repo);
        let limits = limits_for(Plan::Free);

        assert_eq!(archiver.excess(user_id, &limits).await.unwrap().folders, 3);
        assert_eq!(archiver.usage(user_id).await.unwrap().folders, 8);
    }
}
