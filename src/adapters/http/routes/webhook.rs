//! Stripe webhook endpoint.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::{info, warn};

use crate::{
    adapters::http::{app_error_impl::error_resp, app_state::AppState},
    app_error::{AppError, AppResult, ErrorCode},
    domain::entities::webhook_event::StripeEventType,
    infra::stripe_client::StripeClient,
    use_cases::stripe_events::WebhookOutcome,
};

const SERVICE_NAME: &str = "payment-events";

/// POST /api/webhook and /api/webhook/stripe
async fn handle_stripe_webhook(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Response> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::InvalidSignature("Missing Stripe signature".into()))?;

    StripeClient::verify_webhook_signature(
        &body,
        signature,
        app_state.config.stripe_webhook_secret.expose_secret(),
    )?;

    let payload: serde_json::Value = serde_json::from_str(&body)
        .map_err(|e| AppError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;

    let outcome = app_state
        .stripe_events
        .process_payload(payload, Utc::now())
        .await?;

    Ok(outcome_response(outcome))
}

fn outcome_response(outcome: WebhookOutcome) -> Response {
    match outcome {
        WebhookOutcome::Processed { event_type } => {
            Json(json!({ "received": true, "type": event_type })).into_response()
        }
        WebhookOutcome::Ignored { event_type } => {
            info!(event_type = %event_type, "Ignoring unhandled event type");
            Json(json!({ "received": true, "ignored": true })).into_response()
        }
        WebhookOutcome::TestModeBlocked => {
            Json(json!({ "received": true, "testMode": true, "blocked": true })).into_response()
        }
        WebhookOutcome::Duplicate => {
            Json(json!({ "received": true, "duplicate": true })).into_response()
        }
        WebhookOutcome::InProgress => {
            error_resp(StatusCode::CONFLICT, ErrorCode::EventInProgress, None)
        }
        WebhookOutcome::PermanentlyFailed => {
            error_resp(StatusCode::BAD_REQUEST, ErrorCode::EventPermanentlyFailed, None)
        }
        // Acknowledged so Stripe stops redelivering; the retry worker owns it now.
        WebhookOutcome::Failed { event_type, message } => {
            warn!(event_type = %event_type, error = %message, "Webhook processing failed, queued for retry");
            Json(json!({ "received": true, "error": true })).into_response()
        }
    }
}

/// GET /api/webhook/health
async fn health() -> impl IntoResponse {
    let events: Vec<&'static str> = StripeEventType::ALL.iter().map(|t| t.as_ref()).collect();
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "events": events,
    }))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handle_stripe_webhook))
        .route("/stripe", post(handle_stripe_webhook))
        .route("/health", get(health))
}
