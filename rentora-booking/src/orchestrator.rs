use async_trait::async_trait;
use chrono::Utc;
use rentora_core::payment::{PaymentAdapter, PaymentError, PaymentIntent, PaymentStatus, RefundReceipt};
use rentora_core::Reservation;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

/// What the client needs to complete payment for a new reservation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentDescriptor {
    pub intent_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub client_secret: Option<String>,
}

impl From<PaymentIntent> for PaymentDescriptor {
    fn from(intent: PaymentIntent) -> Self {
        Self {
            intent_id: intent.id,
            amount: intent.amount,
            currency: intent.currency,
            status: intent.status,
            client_secret: intent.client_secret,
        }
    }
}

pub struct PaymentOrchestrator {
    adapter: Arc<dyn PaymentAdapter>,
}

impl PaymentOrchestrator {
    pub fn new(adapter: Arc<dyn PaymentAdapter>) -> Self {
        Self { adapter }
    }

    /// Open a payment intent for the reservation's full total (rental, fees and deposit).
    pub async fn initialize_payment(&self, reservation: &Reservation) -> Result<PaymentDescriptor, PaymentError> {
        let intent = self
            .adapter
            .create_intent(reservation.id, reservation.total_amount, &reservation.currency)
            .await?;
        Ok(intent.into())
    }

    /// Re-read an intent from the provider. Webhook payloads are only a hint.
    pub async fn verify(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        self.adapter.get_intent(intent_id).await
    }

    pub async fn refund(&self, intent_id: &str, amount: Decimal) -> Result<RefundReceipt, PaymentError> {
        let receipt = self.adapter.refund(intent_id, amount).await?;
        info!("Refunded {} on intent {} ({})", amount, intent_id, receipt.id);
        Ok(receipt)
    }
}

#[derive(Default)]
struct MockLedger {
    intents: HashMap<String, PaymentIntent>,
    refunded: HashMap<String, Decimal>,
}

/// In-process stand-in for a card processor.
///
/// Intents read back as `Succeeded` (the customer paid) unless [`decline`](Self::decline)d.
#[derive(Default)]
pub struct MockPaymentAdapter {
    ledger: Mutex<MockLedger>,
}

impl MockPaymentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intent_id_for(reservation_id: Uuid) -> String {
        format!("mock_pi_{}", reservation_id.simple())
    }

    pub async fn decline(&self, intent_id: &str) {
        if let Some(intent) = self.ledger.lock().await.intents.get_mut(intent_id) {
            intent.status = PaymentStatus::Failed;
        }
    }

    pub async fn refunded_total(&self, intent_id: &str) -> Decimal {
        self.ledger
            .lock()
            .await
            .refunded
            .get(intent_id)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }
}

#[async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn create_intent(
        &self,
        reservation_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        let mut ledger = self.ledger.lock().await;
        let id = Self::intent_id_for(reservation_id);
        // One intent per reservation, like a processor-side idempotency key
        if let Some(existing) = ledger.intents.get(&id) {
            return Ok(existing.clone());
        }
        let intent = PaymentIntent {
            id,
            reservation_id,
            amount,
            currency: currency.to_string(),
            status: PaymentStatus::RequiresPaymentMethod,
            processor_fee: None,
            client_secret: Some(format!("mock_secret_{}", reservation_id.simple())),
            created_at: Utc::now(),
        };
        ledger.intents.insert(intent.id.clone(), intent.clone());
        Ok(intent)
    }

    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        let mut ledger = self.ledger.lock().await;
        let intent = ledger
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| PaymentError::IntentNotFound(intent_id.to_string()))?;
        if intent.status == PaymentStatus::RequiresPaymentMethod {
            intent.status = PaymentStatus::Succeeded;
        }
        Ok(intent.clone())
    }

    async fn refund(&self, intent_id: &str, amount: Decimal) -> Result<RefundReceipt, PaymentError> {
        let mut ledger = self.ledger.lock().await;
        let captured = match ledger.intents.get(intent_id) {
            Some(intent) if intent.status == PaymentStatus::Succeeded => intent.amount,
            Some(_) => return Err(PaymentError::Rejected(format!("{} was never captured", intent_id))),
            None => return Err(PaymentError::IntentNotFound(intent_id.to_string())),
        };

        let already = ledger.refunded.get(intent_id).copied().unwrap_or(Decimal::ZERO);
        if already + amount > captured {
            return Err(PaymentError::Rejected(format!(
                "refund of {} exceeds the remaining {}",
                amount,
                captured - already
            )));
        }
        ledger.refunded.insert(intent_id.to_string(), already + amount);

        Ok(RefundReceipt {
            id: format!("mock_re_{}", Uuid::new_v4().simple()),
            intent_id: intent_id.to_string(),
            amount,
            created_at: Utc::now(),
        })
    }
}
