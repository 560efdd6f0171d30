use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rentora_booking::ExtensionDecision;
use rentora_core::{Actor, ExtensionRequest, Reservation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, reservations::observe, state::AppState};

#[derive(Debug, Deserialize)]
pub struct RequestExtension {
    pub new_end_date: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct DecideExtension {
    pub decision: ExtensionDecision,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub reservation: Reservation,
    pub extension: ExtensionRequest,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/reservations/{id}/extensions",
            post(request_extension).get(list_extensions),
        )
        .route("/v1/extensions/{id}/decision", post(decide_extension))
}

/// POST /v1/reservations/{id}/extensions
async fn request_extension(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(reservation_id): Path<Uuid>,
    Json(req): Json<RequestExtension>,
) -> Result<(StatusCode, Json<ExtensionRequest>), AppError> {
    let extension = state
        .engine
        .extensions
        .request(&actor, reservation_id, req.new_end_date)
        .await
        .map_err(|e| observe(&state.metrics, e))?;
    Ok((StatusCode::CREATED, Json(extension)))
}

/// GET /v1/reservations/{id}/extensions
async fn list_extensions(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<Vec<ExtensionRequest>>, AppError> {
    let extensions = state.engine.extensions.list(&actor, reservation_id).await?;
    Ok(Json(extensions))
}

/// POST /v1/extensions/{id}/decision
async fn decide_extension(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(extension_id): Path<Uuid>,
    Json(req): Json<DecideExtension>,
) -> Result<Json<DecisionResponse>, AppError> {
    let (reservation, extension) = state
        .engine
        .extensions
        .decide(&actor, extension_id, req.decision, req.reason)
        .await
        .map_err(|e| observe(&state.metrics, e))?;
    Ok(Json(DecisionResponse { reservation, extension }))
}
