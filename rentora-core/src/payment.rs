use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    RequiresPaymentMethod,
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String, // Provider's ID (e.g., pi_123)
    pub reservation_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    /// Fee reported by the processor once the charge succeeded
    pub processor_fee: Option<Decimal>,
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub id: String,
    pub intent_id: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment intent not found: {0}")]
    IntentNotFound(String),

    #[error("Payment provider rejected the request: {0}")]
    Rejected(String),

    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),
}

/// Capability contract of the payment processor.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Create a payment intent with the provider
    async fn create_intent(
        &self,
        reservation_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentIntent, PaymentError>;

    /// Retrieve intent status
    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError>;

    /// Refund (part of) a captured payment
    async fn refund(&self, intent_id: &str, amount: Decimal) -> Result<RefundReceipt, PaymentError>;
}
