use axum::{
    extract::{Path, State},
    routing::get,
    Extension, Json, Router,
};
use rentora_booking::SettleDeposit;
use rentora_core::{Actor, SettlementRecord};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/v1/reservations/{id}/settlement",
        get(get_settlement).post(settle_deposit),
    )
}

/// GET /v1/reservations/{id}/settlement
async fn get_settlement(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(reservation_id): Path<Uuid>,
) -> Result<Json<SettlementRecord>, AppError> {
    let record = state.engine.ledger.get(&actor, reservation_id).await?;
    Ok(Json(record))
}

/// POST /v1/reservations/{id}/settlement
/// Body `{"action": "release" | "retain" | "refund", "amount"?, "reason"?}`.
async fn settle_deposit(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(reservation_id): Path<Uuid>,
    Json(req): Json<SettleDeposit>,
) -> Result<Json<SettlementRecord>, AppError> {
    let record = state.engine.ledger.settle(&actor, reservation_id, req).await?;
    Ok(Json(record))
}
