use std::net::SocketAddr;

use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub stripe_secret_key: SecretString,
    /// Signing secret for the `stripe-signature` header.
    pub stripe_webhook_secret: SecretString,
    /// Billing portal configuration used for payment-update sessions.
    pub stripe_portal_config_id: Option<String>,
    pub resend_api_key: SecretString,
    pub email_from: String,
    pub support_email: String,
    /// Base URL of the customer-facing app; portal sessions return to `{app_base_url}/billing`.
    pub app_base_url: Url,
    /// Recipients allowed to receive mail triggered by test-mode events.
    pub test_email_whitelist: Vec<String>,
    /// Drop test-mode events before they reach the ledger.
    pub block_test_events: bool,
    pub sweep_interval_secs: u64,
    pub webhook_retry_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url: String = get_env("DATABASE_URL");
        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 5000)));

        let stripe_secret_key = SecretString::new(get_env::<String>("STRIPE_SECRET_KEY").into());
        let stripe_webhook_secret =
            SecretString::new(get_env::<String>("STRIPE_WEBHOOK_SECRET").into());
        let stripe_portal_config_id = std::env::var("STRIPE_PORTAL_CONFIG_ID")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let resend_api_key = SecretString::new(get_env::<String>("RESEND_API_KEY").into());
        let email_from: String = get_env("EMAIL_FROM");
        let support_email: String =
            get_env_default("SUPPORT_EMAIL", "support@example.com".to_string());
        let app_base_url: Url = get_env("APP_BASE_URL");

        let test_email_whitelist = parse_list(&get_env_default(
            "TEST_EMAIL_WHITELIST",
            String::new(),
        ));
        let block_test_events: bool = get_env_default("BLOCK_TEST_EVENTS", false);

        let sweep_interval_secs: u64 = get_env_default("SWEEP_INTERVAL_SECS", 86_400);
        let webhook_retry_interval_secs: u64 = get_env_default("WEBHOOK_RETRY_INTERVAL_SECS", 3_600);

        Self {
            database_url,
            bind_addr,
            stripe_secret_key,
            stripe_webhook_secret,
            stripe_portal_config_id,
            resend_api_key,
            email_from,
            support_email,
            app_base_url,
            test_email_whitelist,
            block_test_events,
            sweep_interval_secs,
            webhook_retry_interval_secs,
        }
    }

    pub fn portal_return_url(&self) -> String {
        format!("{}/billing", self.app_base_url.as_str().trim_end_matches('/'))
    }
}

/// Comma-separated list, trimmed and lowercased, empties dropped.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
