use crate::{
    adapters::{email::resend::ResendNotificationGateway, http::app_state::AppState},
    domain::entities::delivery_mode::DeliveryMode,
    infra::{config::AppConfig, postgres_persistence, stripe_client::StripeClient},
    use_cases::{
        alerts::AlertRepoTrait,
        billing_record::{BillingRecordRepoTrait, BillingRecordStore},
        grace_period::GracePeriodSweeper,
        payment_failures::{DunningSettings, PaymentFailureUseCases},
        plan_catalog::{PlanCatalog, PlanConfigRepoTrait},
        resource_archiver::{ResourceArchiver, ResourceRepoTrait},
        stripe_events::{StripeEventSettings, StripeEventUseCases},
        user_directory::UserRepoTrait,
        webhook_ledger::{WebhookEventRepoTrait, WebhookLedger},
    },
};
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Everything `main` needs: the HTTP state plus the background jobs.
pub struct Services {
    pub app_state: AppState,
    pub sweeper: Arc<GracePeriodSweeper>,
}

pub async fn init_app_state() -> anyhow::Result<Services> {
    let config = AppConfig::from_env();

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);

    let notifier = Arc::new(ResendNotificationGateway::new(
        config.resend_api_key.clone(),
        config.email_from.clone(),
        config.app_base_url.as_str().trim_end_matches('/').to_string(),
        config.test_email_whitelist.clone(),
    ));
    let portal = Arc::new(StripeClient::new(
        config.stripe_secret_key.clone(),
        config.stripe_portal_config_id.clone(),
    ));

    let store = Arc::new(BillingRecordStore::new(
        postgres_arc.clone() as Arc<dyn BillingRecordRepoTrait>
    ));
    let users = postgres_arc.clone() as Arc<dyn UserRepoTrait>;
    let catalog = Arc::new(PlanCatalog::new(
        postgres_arc.clone() as Arc<dyn PlanConfigRepoTrait>
    ));
    let archiver = Arc::new(ResourceArchiver::new(
        postgres_arc.clone() as Arc<dyn ResourceRepoTrait>
    ));
    let alerts = postgres_arc.clone() as Arc<dyn AlertRepoTrait>;
    let ledger = Arc::new(WebhookLedger::new(
        postgres_arc.clone() as Arc<dyn WebhookEventRepoTrait>
    ));

    let payment_failures = PaymentFailureUseCases::new(
        store.clone(),
        users.clone(),
        catalog.clone(),
        archiver.clone(),
        notifier.clone(),
        portal,
        DunningSettings {
            portal_return_url: config.portal_return_url(),
            support_email: config.support_email.clone(),
        },
    );

    let stripe_events = StripeEventUseCases::new(
        ledger,
        Arc::new(payment_failures),
        StripeEventSettings {
            block_test_events: config.block_test_events,
        },
    );

    // The sweeper acts on live subscriptions only.
    let sweeper = GracePeriodSweeper::new(
        store,
        users,
        catalog,
        archiver,
        notifier,
        alerts,
        DeliveryMode::Live,
    );

    Ok(Services {
        app_state: AppState {
            config: Arc::new(config),
            stripe_events: Arc::new(stripe_events),
        },
        sweeper: Arc::new(sweeper),
    })
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "payment_events=debug,tower_http=debug".into());

    let console_layer = fmt::layer().with_target(false).with_level(true).pretty();

    // JSON file logs are optional; a read-only working dir still gets console output.
    let json_layer = match File::create("app.log") {
        Ok(file) => Some(
            fmt::layer()
                .json()
                .with_writer(file)
                .with_current_span(true)
                .with_span_list(true),
        ),
        Err(e) => {
            eprintln!("app.log unavailable, logging to console only: {e}");
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();
}
