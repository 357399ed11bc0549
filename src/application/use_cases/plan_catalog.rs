use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::{
    app_error::AppResult,
    domain::entities::plan::{
        Plan, PlanFeatures, PlanLimits, features_for, limits_for, price_cents_for,
    },
};

/// One plan as configured in the catalog store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanConfigProfile {
    pub plan: Plan,
    pub stripe_price_id: Option<String>,
    pub name: String,
    pub price_cents: i64,
    pub currency: String,
    pub limits: PlanLimits,
    pub features: PlanFeatures,
    pub is_active: bool,
}

impl PlanConfigProfile {
    /// Built-in definition for `plan`.
    pub fn builtin(plan: Plan) -> Self {
        Self {
            plan,
            stripe_price_id: None,
            name: plan.display_name().to_string(),
            price_cents: price_cents_for(plan),
            currency: "usd".to_string(),
            limits: limits_for(plan),
            features: features_for(plan),
            is_active: true,
        }
    }
}

#[async_trait]
pub trait PlanConfigRepoTrait: Send + Sync {
    async fn get_by_plan(&self, plan: Plan) -> AppResult<Option<PlanConfigProfile>>;
}

/// Single source of plan limits, features and pricing.
///
/// Reads the store first and falls back to the built-in table when the store
/// has no active row or cannot be reached.
pub struct PlanCatalog {
    repo: Arc<dyn PlanConfigRepoTrait>,
}

impl PlanCatalog {
    pub fn new(repo: Arc<dyn PlanConfigRepoTrait>) -> Self {
        Self { repo }
    }

    pub async fn entry(&self, plan: Plan) -> PlanConfigProfile {
        match self.repo.get_by_plan(plan).await {
            Ok(Some(config)) if config.is_active => config,
            Ok(_) => PlanConfigProfile::builtin(plan),
            Err(e) => {
                warn!(plan = %plan, error = %e, "Plan catalog lookup failed, using built-in plan table");
                PlanConfigProfile::builtin(plan)
            }
        }
    }

    pub async fn limits_for(&self, plan: Plan) -> PlanLimits {
        self.entry(plan).await.limits
    }

    pub async fn features_for(&self, plan: Plan) -> PlanFeatures {
        self.entry(plan).await.features
    }

    pub async fn is_free(&self, plan: Plan) -> bool {
        self.entry(plan).await.price_cents == 0
    }
}
