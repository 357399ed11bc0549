use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    app_error::{AppError, AppResult},
    application::{
        email_templates::{payment_failed_email, subscription_email},
        ports::notification::{DunningEmail, NotificationGateway, SubscriptionEmail},
    },
    domain::entities::{billing_record::DunningStage, delivery_mode::DeliveryMode},
    infra::http_client,
};

const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Sends billing email through Resend.
///
/// Mail triggered by test-mode events only reaches addresses on the
/// whitelist; everything else is logged and dropped.
#[derive(Clone)]
pub struct ResendNotificationGateway {
    client: Client,
    api_key: SecretString,
    from: String,
    app_origin: String,
    test_whitelist: Vec<String>,
}

impl ResendNotificationGateway {
    pub fn new(
        api_key: SecretString,
        from: String,
        app_origin: String,
        test_whitelist: Vec<String>,
    ) -> Self {
        Self {
            client: http_client::build_client(),
            api_key,
            from,
            app_origin,
            test_whitelist,
        }
    }

    async fn send(&self, to: &str, subject: &str, html: &str, mode: DeliveryMode) -> AppResult<()> {
        if !may_deliver(&self.test_whitelist, to, mode) {
            info!(to, subject, mode = %mode, "Skipping test-mode email to non-whitelisted recipient");
            return Ok(());
        }

        let body = ResendReq {
            from: &self.from,
            to: [to],
            subject,
            html,
        };

        self.client
            .post(RESEND_API_URL)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Notification(format!("Failed to send email: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::Notification(format!("Email API error: {e}")))?;

        debug!(to, subject, mode = %mode, "Email sent");
        Ok(())
    }
}

#[derive(Serialize)]
struct ResendReq<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

/// Live mail always goes out. Test mail only to whitelisted addresses.
fn may_deliver(whitelist: &[String], to: &str, mode: DeliveryMode) -> bool {
    match mode {
        DeliveryMode::Live => true,
        DeliveryMode::Test => {
            let to = to.trim().to_lowercase();
            whitelist.iter().any(|allowed| *allowed == to)
        }
    }
}

#[async_trait]
impl NotificationGateway for ResendNotificationGateway {
    async fn send_payment_failed_email(
        &self,
        to: &str,
        stage: DunningStage,
        email: &DunningEmail,
        mode: DeliveryMode,
    ) -> AppResult<()> {
        let (subject, html) = payment_failed_email(&self.app_origin, stage, email);
        self.send(to, &subject, &html, mode).await
    }

    async fn send_subscription_email(
        &self,
        to: &str,
        email: &SubscriptionEmail,
        mode: DeliveryMode,
    ) -> AppResult<()> {
        let (subject, html) = subscription_email(&self.app_origin, email);
        self.send(to, &subject, &html, mode).await
    }
}
