//! Wiring helpers that assemble use cases and `AppState` from in-memory mocks.

use std::sync::Arc;

use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::use_cases::{
        billing_record::BillingRecordStore,
        payment_failures::{DunningSettings, PaymentFailureUseCases},
        plan_catalog::PlanCatalog,
        resource_archiver::ResourceArchiver,
        stripe_events::{StripeEventSettings, StripeEventUseCases},
        webhook_ledger::WebhookLedger,
    },
    domain::entities::billing_record::BillingRecord,
    infra::config::AppConfig,
    test_utils::{
        InMemoryBillingRecordRepo, InMemoryPlanConfigRepo, InMemoryResourceRepo,
        InMemoryUserRepo, InMemoryWebhookEventRepo, RecordingNotificationGateway,
        StubPaymentPortal, create_test_user,
    },
};

pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

// ============================================================================
// TestDeps
// ============================================================================

/// Shared in-memory dependencies, kept so tests can inspect them afterwards.
pub struct TestDeps {
    pub events: Arc<InMemoryWebhookEventRepo>,
    pub records: Arc<InMemoryBillingRecordRepo>,
    pub users: Arc<InMemoryUserRepo>,
    pub resources: Arc<InMemoryResourceRepo>,
    pub plans: Arc<InMemoryPlanConfigRepo>,
    pub notifier: Arc<RecordingNotificationGateway>,
    pub portal: Arc<StubPaymentPortal>,
}

impl TestDeps {
    /// One user per record, everything else empty.
    pub fn with_records(records: Vec<BillingRecord>) -> Self {
        let users = records
            .iter()
            .map(|r| create_test_user(|u| u.id = r.user_id))
            .collect();
        Self {
            events: Arc::new(InMemoryWebhookEventRepo::new()),
            records: Arc::new(InMemoryBillingRecordRepo::with_records(records)),
            users: Arc::new(InMemoryUserRepo::with_users(users)),
            resources: Arc::new(InMemoryResourceRepo::new()),
            plans: Arc::new(InMemoryPlanConfigRepo::new()),
            notifier: Arc::new(RecordingNotificationGateway::new()),
            portal: Arc::new(StubPaymentPortal::new()),
        }
    }

    pub fn payment_failure_use_cases(&self) -> PaymentFailureUseCases {
        PaymentFailureUseCases::new(
            Arc::new(BillingRecordStore::new(self.records.clone())),
            self.users.clone(),
            Arc::new(PlanCatalog::new(self.plans.clone())),
            Arc::new(ResourceArchiver::new(self.resources.clone())),
            self.notifier.clone(),
            self.portal.clone(),
            DunningSettings {
                portal_return_url: "https://app.example.com/billing".into(),
                support_email: "support@example.com".into(),
            },
        )
    }

    pub fn stripe_event_use_cases(&self, block_test_events: bool) -> StripeEventUseCases {
        StripeEventUseCases::new(
            Arc::new(WebhookLedger::new(self.events.clone())),
            Arc::new(self.payment_failure_use_cases()),
            StripeEventSettings { block_test_events },
        )
    }
}

// ============================================================================
// TestAppStateBuilder
// ============================================================================

pub struct TestAppStateBuilder {
    deps: TestDeps,
    block_test_events: bool,
}

impl TestAppStateBuilder {
    pub fn new(deps: TestDeps) -> Self {
        Self {
            deps,
            block_test_events: false,
        }
    }

    pub fn block_test_events(mut self) -> Self {
        self.block_test_events = true;
        self
    }

    /// Returns the state together with the dependencies it was built from.
    pub fn build(self) -> (AppState, TestDeps) {
        let stripe_events = self.deps.stripe_event_use_cases(self.block_test_events);
        let state = AppState {
            config: Arc::new(test_config()),
            stripe_events: Arc::new(stripe_events),
        };
        (state, self.deps)
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/payment_events_test".into(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        stripe_secret_key: SecretString::new("sk_test_123".into()),
        stripe_webhook_secret: SecretString::new(TEST_WEBHOOK_SECRET.into()),
        stripe_portal_config_id: None,
        resend_api_key: SecretString::new("re_test_123".into()),
        email_from: "billing@example.com".into(),
        support_email: "support@example.com".into(),
        app_base_url: Url::parse("https://app.example.com").unwrap(),
        test_email_whitelist: vec!["qa@example.com".into()],
        block_test_events: false,
        sweep_interval_secs: 86_400,
        webhook_retry_interval_secs: 3_600,
    }
}
