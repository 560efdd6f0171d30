use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Extension, Json, Router,
};
use rentora_booking::{BookingError, CreateReservation, CreatedReservation, LifecycleAction};
use rentora_core::{Actor, Reservation};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::AppError, metrics::ApiMetrics, state::AppState};

pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: LifecycleAction,
    pub reason: Option<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation))
        .route("/v1/reservations/{id}", get(get_reservation))
        .route("/v1/reservations/{id}/actions", post(apply_action))
}

/// Count availability rejections before handing the error back.
pub(crate) fn observe(metrics: &ApiMetrics, err: BookingError) -> AppError {
    if matches!(err, BookingError::Conflict { .. }) {
        metrics.booking_conflicts.inc();
    }
    err.into()
}

/// POST /v1/reservations
/// 201 for a new reservation, 200 when an `Idempotency-Key` replays an earlier one.
async fn create_reservation(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    headers: HeaderMap,
    Json(mut req): Json<CreateReservation>,
) -> Result<(StatusCode, Json<CreatedReservation>), AppError> {
    req.idempotency_key = headers
        .get(IDEMPOTENCY_KEY)
        .map(|v| v.to_str())
        .transpose()
        .map_err(|_| AppError::ValidationError("Idempotency-Key must be visible ASCII".to_string()))?
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string);

    let created = state
        .engine
        .reservations
        .create(&actor, req)
        .await
        .map_err(|e| observe(&state.metrics, e))?;

    state.metrics.reaped(created.reaped);
    let status = if created.replayed {
        StatusCode::OK
    } else {
        state.metrics.reservations_created.inc();
        StatusCode::CREATED
    };

    Ok((status, Json(created)))
}

/// GET /v1/reservations/{id}
async fn get_reservation(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Reservation>, AppError> {
    let reservation = state.engine.reservations.get(&actor, id).await?;
    Ok(Json(reservation))
}

/// POST /v1/reservations/{id}/actions
async fn apply_action(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<Uuid>,
    Json(req): Json<ActionRequest>,
) -> Result<Json<Reservation>, AppError> {
    let reservation = state
        .engine
        .reservations
        .apply_action(&actor, id, req.action, req.reason)
        .await
        .map_err(|e| observe(&state.metrics, e))?;

    state.metrics.transition(req.action.as_str());
    Ok(Json(reservation))
}
