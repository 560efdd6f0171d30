use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rentora_booking::BookingError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    ValidationError(String),
    Booking(BookingError),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, conflicts) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHENTICATED", msg, None),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg, None),
            AppError::Booking(err) => {
                let status = match &err {
                    BookingError::Validation(_) => StatusCode::BAD_REQUEST,
                    BookingError::Authorization(_) => StatusCode::FORBIDDEN,
                    BookingError::NotFound { .. } => StatusCode::NOT_FOUND,
                    BookingError::Conflict { .. } | BookingError::State(_) => StatusCode::CONFLICT,
                    BookingError::Dependency(_) => {
                        tracing::error!("Dependency failure: {}", err);
                        StatusCode::BAD_GATEWAY
                    }
                };
                let conflicts = match &err {
                    BookingError::Conflict { ids } => Some(ids.clone()),
                    _ => None,
                };
                (status, err.code(), err.to_string(), conflicts)
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Internal Server Error".to_string(), None)
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", "Internal Server Error".to_string(), None)
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(ids) = conflicts {
            body["conflicting_reservations"] = json!(ids);
        }

        (status, Json(body)).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        Self::Booking(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}

impl From<prometheus::Error> for AppError {
    fn from(err: prometheus::Error) -> Self {
        Self::Anyhow(err.into())
    }
}
