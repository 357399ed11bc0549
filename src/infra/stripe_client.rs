use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{
    app_error::{AppError, AppResult},
    application::ports::payment_portal::PaymentPortal,
    infra::http_client::build_client,
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Signed timestamps further than this from now are rejected.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    portal_config_id: Option<String>,
}

impl StripeClient {
    pub fn new(secret_key: SecretString, portal_config_id: Option<String>) -> Self {
        Self {
            client: build_client(),
            secret_key,
            portal_config_id,
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    // ========================================================================
    // Billing portal
    // ========================================================================

    /// Creates a billing-portal session. With `payment_update` the session
    /// opens directly on the payment-method update flow.
    pub async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
        payment_update: bool,
    ) -> AppResult<StripePortalSession> {
        let mut params = vec![("customer", customer_id), ("return_url", return_url)];
        if let Some(config_id) = self.portal_config_id.as_deref() {
            params.push(("configuration", config_id));
        }
        if payment_update {
            params.push(("flow_data[type]", "payment_method_update"));
        }

        let response = self
            .client
            .post(format!("{}/billing_portal/sessions", STRIPE_API_BASE))
            .header("Authorization", self.auth_header())
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Webhook Signature Verification
    // ========================================================================

    pub fn verify_webhook_signature(
        payload: &str,
        signature_header: &str,
        webhook_secret: &str,
    ) -> AppResult<()> {
        Self::verify_webhook_signature_at(
            payload,
            signature_header,
            webhook_secret,
            chrono::Utc::now().timestamp(),
        )
    }

    /// Checks a `t=…,v1=…` header against `now` (unix seconds).
    pub fn verify_webhook_signature_at(
        payload: &str,
        signature_header: &str,
        webhook_secret: &str,
        now: i64,
    ) -> AppResult<()> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp
            .ok_or_else(|| AppError::InvalidSignature("Missing timestamp in signature".into()))?;

        if signatures.is_empty() {
            return Err(AppError::InvalidSignature("Missing signature".into()));
        }

        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal("HMAC error".into()))?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        if !signatures.iter().any(|sig| constant_time_compare(sig, &expected)) {
            return Err(AppError::InvalidSignature("Invalid signature".into()));
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| AppError::InvalidSignature("Invalid timestamp".into()))?;
        if (now - ts).abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(AppError::InvalidSignature("Timestamp outside tolerance".into()));
        }

        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");

            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(AppError::Internal(format!(
                    "Stripe error: {}",
                    error.error.message.unwrap_or(error.error.error_type)
                )));
            }

            return Err(AppError::Internal(format!(
                "Stripe API error: {} - {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Stripe response");
            AppError::Internal(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

#[async_trait]
impl PaymentPortal for StripeClient {
    async fn generate_update_payment_url(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> AppResult<String> {
        match self.create_portal_session(customer_id, return_url, true).await {
            Ok(session) => return Ok(session.url),
            Err(e) => {
                warn!(customer_id, error = %e, "Payment-update portal flow failed, trying standard portal");
            }
        }

        let session = self
            .create_portal_session(customer_id, return_url, false)
            .await?;
        debug!(customer_id, session_id = %session.id, "Created standard portal session");
        Ok(session.url)
    }
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

// ============================================================================
// Stripe Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripePortalSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct StripeErrorResponse {
    pub error: StripeError,
}

#[derive(Debug, Deserialize)]
pub struct StripeError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: Option<String>,
}
