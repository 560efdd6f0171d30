use axum::{
    http::{header, HeaderName, Method},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod extensions;
pub mod metrics;
pub mod middleware;
pub mod reservations;
pub mod settlements;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::USER_AGENT,
            HeaderName::from_static(reservations::IDEMPOTENCY_KEY),
        ]);

    // Everything a renter, owner or admin calls needs a verified token
    let authenticated = Router::new()
        .merge(reservations::routes())
        .merge(extensions::routes())
        .merge(settlements::routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(authenticated)
        .merge(webhooks::routes())
        .merge(metrics::routes())
        .route("/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
