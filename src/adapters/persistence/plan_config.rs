use async_trait::async_trait;
use sqlx::Row;

use crate::{
    adapters::persistence::{PostgresPersistence, parse_json_with_fallback},
    app_error::{AppError, AppResult},
    application::use_cases::plan_catalog::{PlanConfigProfile, PlanConfigRepoTrait},
    domain::entities::plan::Plan,
};

fn row_to_profile(plan: Plan, row: sqlx::postgres::PgRow) -> PlanConfigProfile {
    let entity_id = plan.to_string();
    PlanConfigProfile {
        plan,
        stripe_price_id: row.get("stripe_price_id"),
        name: row.get("name"),
        price_cents: row.get("price_cents"),
        currency: row.get("currency"),
        limits: parse_json_with_fallback(&row.get("limits"), "limits", "plan_config", &entity_id),
        features: parse_json_with_fallback(
            &row.get("features"),
            "features",
            "plan_config",
            &entity_id,
        ),
        is_active: row.get("is_active"),
    }
}

#[async_trait]
impl PlanConfigRepoTrait for PostgresPersistence {
    async fn get_by_plan(&self, plan: Plan) -> AppResult<Option<PlanConfigProfile>> {
        let row = sqlx::query(
            r#"
            SELECT stripe_price_id, name, price_cents, currency, limits, features, is_active
            FROM plan_configs WHERE plan = $1
            "#,
        )
        .bind(plan.as_ref())
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;

        Ok(row.map(|row| row_to_profile(plan, row)))
    }
}
