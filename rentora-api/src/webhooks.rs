use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use rentora_booking::CaptureOutcome;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: PaymentIntentObject,
}

/// Only the id is used; status is re-read from the processor.
#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: &'static str,
}

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

const HANDLED: &[&str] = &[
    "payment_intent.succeeded",
    "payment_intent.payment_failed",
    "payment_intent.canceled",
];

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

/// POST /v1/webhooks/payments
/// Non-2xx answers make the processor redeliver, so dependency failures propagate.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PaymentWebhook>,
) -> Result<Json<WebhookAck>, AppError> {
    if let Some(expected) = &state.auth.webhook_secret {
        let presented = headers
            .get(WEBHOOK_SECRET_HEADER)
            .and_then(|v| v.to_str().ok());
        if presented != Some(expected.as_str()) {
            tracing::warn!("Rejected payment webhook {} with a missing or wrong secret", payload.id);
            return Err(AppError::AuthenticationError("invalid webhook secret".to_string()));
        }
    }

    tracing::info!(
        "Received webhook {}: {} for intent {}",
        payload.id,
        payload.type_,
        payload.data.object.id
    );

    if !HANDLED.contains(&payload.type_.as_str()) {
        return Ok(Json(WebhookAck {
            received: true,
            outcome: "ignored",
        }));
    }

    let outcome = state
        .engine
        .reservations
        .on_payment_event(&payload.data.object.id)
        .await?;

    let outcome = match outcome {
        CaptureOutcome::Settled { reservation, .. } => {
            tracing::info!(
                "Payment captured for reservation {} ({})",
                reservation.id,
                reservation.status
            );
            "settled"
        }
        CaptureOutcome::Refunded { reservation_id, amount } => {
            tracing::warn!("Refunded {} for unavailable reservation {}", amount, reservation_id);
            "refunded"
        }
        CaptureOutcome::NotCaptured { reservation_id, status } => {
            tracing::info!("Payment for reservation {} not captured: {:?}", reservation_id, status);
            "not_captured"
        }
    };

    Ok(Json(WebhookAck {
        received: true,
        outcome,
    }))
}
