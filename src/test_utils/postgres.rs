//! Postgres fixtures for the sqlx adapter tests.
//!
//! Adapter tests run against the database named by `DATABASE_URL` and return
//! early when it is unset. Every fixture uses fresh ids, so tests can share one
//! database and run in parallel.

use uuid::Uuid;

use crate::{
    adapters::persistence::{PostgresPersistence, to_json},
    domain::entities::{billing_record::BillingRecord, resource::ResourceKind},
    infra::db::{init_db, run_migrations},
};

/// Connects and migrates, or returns `None` when `DATABASE_URL` is unset.
pub async fn test_persistence() -> Option<PostgresPersistence> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres adapter test");
        return None;
    };
    let pool = init_db(&url).await.expect("Failed to connect to DATABASE_URL");
    run_migrations(&pool).await.expect("Failed to run migrations");
    Some(PostgresPersistence::new(pool))
}

pub async fn insert_user(db: &PostgresPersistence, id: Uuid) {
    sqlx::query("INSERT INTO users (id, email, subscription_plan) VALUES ($1, $2, 'premium')")
        .bind(id)
        .bind(format!("{}@example.com", id.simple()))
        .execute(db.pool())
        .await
        .expect("Failed to insert user");
}

/// Inserts the record and its owning user.
pub async fn insert_billing_record(db: &PostgresPersistence, record: &BillingRecord) {
    insert_user(db, record.user_id).await;
    sqlx::query(
        r#"
        INSERT INTO billing_records
            (id, user_id, stripe_customer_id, stripe_subscription_id, stripe_price_id,
             plan, status, account_status, payment_failures, payment_recovery,
             downgrade_grace_period, status_history, limits, features, version,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
        "#,
    )
    .bind(record.id)
    .bind(record.user_id)
    .bind(&record.stripe_customer_id)
    .bind(&record.stripe_subscription_id)
    .bind(&record.stripe_price_id)
    .bind(record.plan.as_ref())
    .bind(record.status.as_ref())
    .bind(record.account_status.as_ref())
    .bind(to_json(&record.payment_failures).unwrap())
    .bind(to_json(&record.payment_recovery).unwrap())
    .bind(to_json(&record.downgrade_grace_period).unwrap())
    .bind(to_json(&record.status_history).unwrap())
    .bind(to_json(&record.limits).unwrap())
    .bind(to_json(&record.features).unwrap())
    .bind(record.version)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(db.pool())
    .await
    .expect("Failed to insert billing record");
}

pub async fn insert_resources(
    db: &PostgresPersistence,
    user_id: Uuid,
    kind: ResourceKind,
    count: usize,
) -> Vec<Uuid> {
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let id = Uuid::new_v4();
        sqlx::query(&format!(
            "INSERT INTO {} (id, user_id, name, created_at) VALUES ($1, $2, $3, NOW() + make_interval(secs => $4))",
            kind.table_name()
        ))
        .bind(id)
        .bind(user_id)
        .bind(format!("{} {}", kind, i))
        .bind(i as f64)
        .execute(db.pool())
        .await
        .expect("Failed to insert resource");
        ids.push(id);
    }
    ids
}

/// Unique Stripe-style id for fixtures.
pub fn unique_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}
