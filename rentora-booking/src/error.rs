use rentora_catalog::availability::AvailabilityError;
use rentora_catalog::pricing::PricingError;
use rentora_core::payment::PaymentError;
use rentora_core::StoreError;
use uuid::Uuid;

/// Failure taxonomy of every booking operation.
#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not allowed: {0}")]
    Authorization(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Dates conflict with active reservations: {ids:?}")]
    Conflict { ids: Vec<Uuid> },

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Dependency failure: {0}")]
    Dependency(String),
}

pub type BookingResult<T> = Result<T, BookingError>;

impl BookingError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        BookingError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BookingError::Validation(_) => "VALIDATION_ERROR",
            BookingError::Authorization(_) => "FORBIDDEN",
            BookingError::NotFound { .. } => "NOT_FOUND",
            BookingError::Conflict { .. } => "CONFLICT",
            BookingError::State(_) => "INVALID_STATE",
            BookingError::Dependency(_) => "DEPENDENCY_FAILURE",
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(ids) => BookingError::Conflict { ids },
            StoreError::StaleWrite(what) => {
                BookingError::State(format!("{} changed concurrently", what))
            }
            StoreError::Duplicate(what) => BookingError::State(format!("already exists: {}", what)),
            StoreError::Backend(msg) => BookingError::Dependency(msg),
        }
    }
}

impl From<PricingError> for BookingError {
    fn from(e: PricingError) -> Self {
        BookingError::Validation(e.to_string())
    }
}

impl From<AvailabilityError> for BookingError {
    fn from(e: AvailabilityError) -> Self {
        BookingError::Validation(e.to_string())
    }
}

impl From<PaymentError> for BookingError {
    fn from(e: PaymentError) -> Self {
        BookingError::Dependency(e.to_string())
    }
}
