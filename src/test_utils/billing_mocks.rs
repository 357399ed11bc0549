//! In-memory mock implementations for the billing repository traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::{
        billing_record::BillingRecordRepoTrait,
        plan_catalog::{PlanConfigProfile, PlanConfigRepoTrait},
        resource_archiver::ResourceRepoTrait,
        user_directory::{UserProfile, UserRepoTrait},
        webhook_ledger::{ClaimOutcome, NewWebhookEvent, WebhookEventRepoTrait},
    },
    domain::entities::{
        account_status::AccountStatus,
        billing_record::BillingRecord,
        plan::Plan,
        resource::{ResourceItem, ResourceKind},
        webhook_event::{
            MAX_RETRIES, ReclaimDecision, WebhookEventError, WebhookEventRecord,
            WebhookEventStatus,
        },
    },
};

// ============================================================================
// InMemoryWebhookEventRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryWebhookEventRepo {
    pub events: Mutex<HashMap<String, WebhookEventRecord>>,
    // Number of upcoming status writes (processed/failed/skipped) that fail.
    mark_failures_pending: Mutex<usize>,
}

impl InMemoryWebhookEventRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<WebhookEventRecord>) -> Self {
        let map = events
            .into_iter()
            .map(|e| (e.provider_event_id.clone(), e))
            .collect();
        Self {
            events: Mutex::new(map),
            ..Default::default()
        }
    }

    pub fn fail_next_marks(&self, times: usize) {
        *self.mark_failures_pending.lock().unwrap() = times;
    }

    fn update(
        &self,
        provider_event_id: &str,
        apply: impl FnOnce(&mut WebhookEventRecord),
    ) -> AppResult<()> {
        {
            let mut pending = self.mark_failures_pending.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                return Err(AppError::Database("simulated ledger write failure".into()));
            }
        }
        let mut events = self.events.lock().unwrap();
        let event = events.get_mut(provider_event_id).ok_or(AppError::NotFound)?;
        apply(event);
        Ok(())
    }
}

#[async_trait]
impl WebhookEventRepoTrait for InMemoryWebhookEventRepo {
    async fn claim(&self, event: &NewWebhookEvent<'_>, now: DateTime<Utc>) -> AppResult<ClaimOutcome> {
        let mut events = self.events.lock().unwrap();

        let Some(existing) = events.get_mut(event.provider_event_id) else {
            let record = WebhookEventRecord {
                id: Uuid::new_v4(),
                provider_event_id: event.provider_event_id.to_string(),
                event_type: event.event_type.to_string(),
                status: WebhookEventStatus::Processing,
                retry_count: 0,
                last_retry_at: None,
                processing_started_at: now,
                payload: event.payload.clone(),
                metadata: event.metadata.clone(),
                error: None,
                created_at: now,
                updated_at: now,
            };
            events.insert(record.provider_event_id.clone(), record.clone());
            return Ok(ClaimOutcome::Claimed(record));
        };

        match existing.reclaim_decision(now) {
            ReclaimDecision::Reclaim { bump_retry } => {
                existing.status = WebhookEventStatus::Processing;
                existing.processing_started_at = now;
                existing.updated_at = now;
                if bump_retry {
                    existing.retry_count += 1;
                }
                Ok(ClaimOutcome::Claimed(existing.clone()))
            }
            ReclaimDecision::Reject(_) => Ok(ClaimOutcome::Existing(existing.clone())),
        }
    }

    async fn get_by_provider_id(&self, provider_event_id: &str) -> AppResult<Option<WebhookEventRecord>> {
        Ok(self.events.lock().unwrap().get(provider_event_id).cloned())
    }

    async fn mark_processed(&self, provider_event_id: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.update(provider_event_id, |e| {
            e.status = WebhookEventStatus::Processed;
            e.error = None;
            e.updated_at = now;
        })
    }

    async fn mark_failed(
        &self,
        provider_event_id: &str,
        error: &WebhookEventError,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.update(provider_event_id, |e| {
            e.status = WebhookEventStatus::Failed;
            e.retry_count += 1;
            e.last_retry_at = Some(now);
            e.error = Some(error.clone());
            e.updated_at = now;
        })
    }

    async fn mark_skipped(&self, provider_event_id: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.update(provider_event_id, |e| {
            e.status = WebhookEventStatus::Skipped;
            e.updated_at = now;
        })
    }

    async fn list_retryable(
        &self,
        retry_before: DateTime<Utc>,
        limit: i64,
    ) -> AppResult<Vec<WebhookEventRecord>> {
        let mut due: Vec<WebhookEventRecord> = self
            .events
            .lock()
            .unwrap()
            .values()
            .filter(|e| {
                e.status == WebhookEventStatus::Failed
                    && e.retry_count < MAX_RETRIES
                    && e.last_retry_at.is_none_or(|at| at < retry_before)
            })
            .cloned()
            .collect();
        due.sort_by_key(|e| e.created_at);
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|_, e| e.created_at >= cutoff);
        Ok((before - events.len()) as u64)
    }
}

// ============================================================================
// InMemoryBillingRecordRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryBillingRecordRepo {
    pub records: Mutex<HashMap<Uuid, BillingRecord>>,
    // Number of upcoming saves that report a version conflict.
    conflicts_pending: Mutex<usize>,
    // Number of upcoming single-record reads that fail.
    read_failures_pending: Mutex<usize>,
}

impl InMemoryBillingRecordRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<BillingRecord>) -> Self {
        let map = records.into_iter().map(|r| (r.id, r)).collect();
        Self {
            records: Mutex::new(map),
            ..Default::default()
        }
    }

    pub fn fail_saves_with_conflict(&self, times: usize) {
        *self.conflicts_pending.lock().unwrap() = times;
    }

    pub fn fail_next_reads(&self, times: usize) {
        *self.read_failures_pending.lock().unwrap() = times;
    }

    pub fn get_by_id_sync(&self, id: Uuid) -> Option<BillingRecord> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    pub fn get_by_subscription(&self, subscription_id: &str) -> Option<BillingRecord> {
        self.records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.stripe_subscription_id == subscription_id)
            .cloned()
    }

    fn check_read(&self) -> AppResult<()> {
        let mut pending = self.read_failures_pending.lock().unwrap();
        if *pending > 0 {
            *pending -= 1;
            return Err(AppError::Database("simulated read failure".into()));
        }
        Ok(())
    }

    fn select(&self, filter: impl Fn(&BillingRecord) -> bool) -> Vec<BillingRecord> {
        let mut records: Vec<BillingRecord> = self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| filter(r))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }
}

#[async_trait]
impl BillingRecordRepoTrait for InMemoryBillingRecordRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<BillingRecord>> {
        self.check_read()?;
        Ok(self.get_by_id_sync(id))
    }

    async fn get_by_subscription_id(&self, subscription_id: &str) -> AppResult<Option<BillingRecord>> {
        self.check_read()?;
        Ok(self.get_by_subscription(subscription_id))
    }

    async fn get_by_customer_id(&self, customer_id: &str) -> AppResult<Option<BillingRecord>> {
        self.check_read()?;
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .find(|r| r.stripe_customer_id == customer_id)
            .cloned())
    }

    async fn save(&self, record: &BillingRecord) -> AppResult<BillingRecord> {
        {
            let mut pending = self.conflicts_pending.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                return Err(AppError::Conflict("simulated concurrent write".into()));
            }
        }

        let mut records = self.records.lock().unwrap();
        let stored = records.get(&record.id).ok_or(AppError::NotFound)?;
        if stored.version != record.version {
            return Err(AppError::Conflict(format!(
                "billing record {} is at version {}, write was based on {}",
                record.id, stored.version, record.version
            )));
        }

        let mut saved = record.clone();
        saved.version += 1;
        records.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn list_expired_grace_periods(&self, now: DateTime<Utc>) -> AppResult<Vec<BillingRecord>> {
        Ok(self.select(|r| {
            r.downgrade_grace_period
                .as_ref()
                .is_some_and(|g| g.auto_archive_scheduled && g.expires_at < now)
        }))
    }

    async fn list_expired_payment_grace(
        &self,
        first_failed_before: DateTime<Utc>,
    ) -> AppResult<Vec<BillingRecord>> {
        Ok(self.select(|r| {
            r.account_status == AccountStatus::GracePeriod
                && r.payment_failures.count >= 4
                && r.payment_failures
                    .first_failed_at
                    .is_some_and(|at| at <= first_failed_before)
        }))
    }

    async fn list_grace_periods_expiring_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<BillingRecord>> {
        Ok(self.select(|r| {
            r.downgrade_grace_period.as_ref().is_some_and(|g| {
                g.auto_archive_scheduled && g.expires_at >= from && g.expires_at <= to
            })
        }))
    }

    async fn clear_stale_grace_periods(
        &self,
        expired_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut cleared = 0;
        for record in self.records.lock().unwrap().values_mut() {
            let stale = record
                .downgrade_grace_period
                .as_ref()
                .is_some_and(|g| !g.auto_archive_scheduled && g.expires_at < expired_before);
            if stale {
                record.downgrade_grace_period = None;
                record.version += 1;
                record.updated_at = now;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    async fn clear_stale_notification_flags(
        &self,
        failed_before: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut cleared = 0;
        for record in self.records.lock().unwrap().values_mut() {
            let failures = &mut record.payment_failures;
            let stale = failures.count == 0
                && failures.notifications_sent.any_sent()
                && failures.last_failed_at.is_some_and(|at| at < failed_before);
            if stale {
                failures.notifications_sent = Default::default();
                record.version += 1;
                record.updated_at = now;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}

// ============================================================================
// InMemoryUserRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryUserRepo {
    pub users: Mutex<HashMap<Uuid, UserProfile>>,
}

impl InMemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<UserProfile>) -> Self {
        let map = users.into_iter().map(|u| (u.id, u)).collect();
        Self {
            users: Mutex::new(map),
        }
    }

    pub fn get(&self, id: Uuid) -> Option<UserProfile> {
        self.users.lock().unwrap().get(&id).cloned()
    }

    pub fn remove(&self, id: Uuid) {
        self.users.lock().unwrap().remove(&id);
    }
}

#[async_trait]
impl UserRepoTrait for InMemoryUserRepo {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<UserProfile>> {
        Ok(self.get(id))
    }

    async fn set_premium_suspended(
        &self,
        id: Uuid,
        suspended: bool,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id).ok_or(AppError::NotFound)?;
        user.premium_suspended = suspended;
        user.premium_suspended_at = suspended.then_some(now);
        Ok(())
    }

    async fn set_subscription_plan(&self, id: Uuid, plan: Plan) -> AppResult<()> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(&id).ok_or(AppError::NotFound)?;
        user.subscription_plan = plan;
        Ok(())
    }
}

// ============================================================================
// InMemoryPlanConfigRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryPlanConfigRepo {
    pub plans: Mutex<HashMap<Plan, PlanConfigProfile>>,
}

impl InMemoryPlanConfigRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: Vec<PlanConfigProfile>) -> Self {
        let map = plans.into_iter().map(|p| (p.plan, p)).collect();
        Self {
            plans: Mutex::new(map),
        }
    }
}

#[async_trait]
impl PlanConfigRepoTrait for InMemoryPlanConfigRepo {
    async fn get_by_plan(&self, plan: Plan) -> AppResult<Option<PlanConfigProfile>> {
        Ok(self.plans.lock().unwrap().get(&plan).cloned())
    }
}

// ============================================================================
// InMemoryResourceRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryResourceRepo {
    pub items: Mutex<HashMap<Uuid, ResourceItem>>,
    failing_users: Mutex<HashSet<Uuid>>,
}

impl InMemoryResourceRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<ResourceItem>) -> Self {
        let map = items.into_iter().map(|i| (i.id, i)).collect();
        Self {
            items: Mutex::new(map),
            ..Default::default()
        }
    }

    pub fn get(&self, id: Uuid) -> Option<ResourceItem> {
        self.items.lock().unwrap().get(&id).cloned()
    }

    pub fn active_count(&self, user_id: Uuid, kind: ResourceKind) -> usize {
        self.items
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.user_id == user_id && i.kind == kind && !i.archived)
            .count()
    }

    /// Makes every read for `user_id` fail.
    pub fn fail_for_user(&self, user_id: Uuid) {
        self.failing_users.lock().unwrap().insert(user_id);
    }

    fn check_user(&self, user_id: Uuid) -> AppResult<()> {
        if self.failing_users.lock().unwrap().contains(&user_id) {
            return Err(AppError::Database("simulated resource store failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceRepoTrait for InMemoryResourceRepo {
    async fn list_active(&self, user_id: Uuid, kind: ResourceKind) -> AppResult<Vec<ResourceItem>> {
        self.check_user(user_id)?;
        let mut items: Vec<ResourceItem> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.user_id == user_id && i.kind == kind && !i.archived)
            .cloned()
            .collect();
        items.sort_by_key(|i| (i.created_at, i.id));
        Ok(items)
    }

    async fn count_active(&self, user_id: Uuid, kind: ResourceKind) -> AppResult<i64> {
        self.check_user(user_id)?;
        Ok(self.active_count(user_id, kind) as i64)
    }

    async fn archive(
        &self,
        kind: ResourceKind,
        ids: &[Uuid],
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut items = self.items.lock().unwrap();
        let mut archived = 0;
        for id in ids {
            if let Some(item) = items.get_mut(id)
                && item.kind == kind
                && !item.archived
            {
                item.archived = true;
                item.archived_at = Some(now);
                item.archived_reason = Some(reason.to_string());
                archived += 1;
            }
        }
        Ok(archived)
    }
}
