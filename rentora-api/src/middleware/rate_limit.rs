use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::state::AppState;

/// Per-IP fixed window through Redis. Fails open when Redis errors, and is a
/// no-op without Redis or without a peer address.
pub async fn rate_limit_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let (Some(redis), Some(ip)) = (state.redis.as_ref(), peer) else {
        return next.run(req).await;
    };

    let key = format!("ratelimit:{}", ip);
    match redis
        .check_rate_limit(&key, state.business_rules.rate_limit_per_minute, 60)
        .await
    {
        Ok(true) => next.run(req).await,
        Ok(false) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "error": "Rate limit exceeded", "code": "RATE_LIMITED" })),
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("Rate limiter unavailable, letting request through: {}", e);
            next.run(req).await
        }
    }
}
