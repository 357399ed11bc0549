use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    domain::entities::billing_record::BillingRecord,
};

/// Attempts per read-modify-write before a version conflict is surfaced.
pub const MAX_WRITE_ATTEMPTS: usize = 3;

#[async_trait]
pub trait BillingRecordRepoTrait: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<BillingRecord>>;

    async fn get_by_subscription_id(&self, subscription_id: &str) -> AppResult<Option<BillingRecord>>;

    async fn get_by_customer_id(&self, customer_id: &str) -> AppResult<Option<BillingRecord>>;

    /// Writes the record if its `version` still matches the stored one and
    /// returns it with the bumped version. Mismatch yields `AppError::Conflict`.
    async fn save(&self, record: &BillingRecord) -> AppResult<BillingRecord>;

    /// Scheduled grace periods whose `expires_at` is before `now`.
    async fn list_expired_grace_periods(&self, now: DateTime<Utc>) -> AppResult<Vec<BillingRecord>>;

    /// Accounts in `grace_period` with four or more failures, the first at or
    /// before `first_failed_before`.
    async fn list_expired_payment_grace(
        &self,
        first_failed_before: DateTime<Utc>,
    ) -> AppResult<Vec<BillingRecord>>;

    /// Scheduled grace periods expiring within `[from, to]`.
    async fn list_grace_periods_expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<BillingRecord>>;

    /// Removes unscheduled grace periods that expired before `expired_before`,
    /// stamping `updated_at` with `now`.
    async fn clear_stale_grace_periods(
        &self,
        expired_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Resets dunning notification flags on records with zero failures whose
    /// last failure is before `failed_before`, stamping `updated_at` with `now`.
    async fn clear_stale_notification_flags(
        &self,
        failed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64>;
}

/// What a mutation closure decided for the current state.
pub enum Mutation<T, S> {
    Apply(T),
    Skip(S),
}

pub enum Modified<T, S> {
    Saved(BillingRecord, T),
    Skipped(BillingRecord, S),
}

/// Billing record access with optimistic read-modify-write.
pub struct BillingRecordStore {
    repo: Arc<dyn BillingRecordRepoTrait>,
}

impl BillingRecordStore {
    pub fn new(repo: Arc<dyn BillingRecordRepoTrait>) -> Self {
        Self { repo }
    }

    pub async fn get_by_subscription_id(&self, subscription_id: &str) -> AppResult<Option<BillingRecord>> {
        self.repo.get_by_subscription_id(subscription_id).await
    }

    pub async fn get_by_customer_id(&self, customer_id: &str) -> AppResult<Option<BillingRecord>> {
        self.repo.get_by_customer_id(customer_id).await
    }

    /// Applies `mutate` to `record` and saves it with `updated_at = now`. On a
    /// version conflict the record is re-read and `mutate` runs again against
    /// the fresh state, so it must derive every change from the record it is
    /// given.
    pub async fn modify<T, S, F>(
        &self,
        record: BillingRecord,
        now: DateTime<Utc>,
        mut mutate: F,
    ) -> AppResult<Modified<T, S>>
    where
        F: FnMut(&mut BillingRecord) -> Mutation<T, S> + Send,
        T: Send,
        S: Send,
    {
        let mut current = record;
        let mut attempt = 1;

        loop {
            let mut next = current.clone();
            let value = match mutate(&mut next) {
                Mutation::Apply(value) => value,
                Mutation::Skip(skip) => return Ok(Modified::Skipped(current, skip)),
            };
            next.updated_at = now;

            match self.repo.save(&next).await {
                Ok(saved) => return Ok(Modified::Saved(saved, value)),
                Err(AppError::Conflict(reason)) if attempt < MAX_WRITE_ATTEMPTS => {
                    debug!(
                        record_id = %current.id,
                        attempt,
                        reason = %reason,
                        "Billing record changed concurrently, retrying"
                    );
                    attempt += 1;
                    current = self
                        .repo
                        .get_by_id(current.id)
                        .await?
                        .ok_or(AppError::NotFound)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn list_expired_grace_periods(&self, now: DateTime<Utc>) -> AppResult<Vec<BillingRecord>> {
        self.repo.list_expired_grace_periods(now).await
    }

    pub async fn list_expired_payment_grace(
        &self,
        first_failed_before: DateTime<Utc>,
    ) -> AppResult<Vec<BillingRecord>> {
        self.repo.list_expired_payment_grace(first_failed_before).await
    }

    pub async fn list_grace_periods_expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<BillingRecord>> {
        self.repo.list_grace_periods_expiring_between(from, to).await
    }

    pub async fn clear_stale_grace_periods(
        &self,
        expired_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.repo.clear_stale_grace_periods(expired_before, now).await
    }

    pub async fn clear_stale_notification_flags(
        &self,
        failed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.repo.clear_stale_notification_flags(failed_before, now).await
    }
}
