use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationCreatedEvent {
    pub reservation_id: Uuid,
    pub item_id: Uuid,
    pub renter_id: String,
    pub owner_id: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ReservationStatusChangedEvent {
    pub reservation_id: Uuid,
    pub from_status: String,
    pub to_status: String,
    pub actor_id: String,
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ExtensionRequestedEvent {
    pub extension_id: Uuid,
    pub reservation_id: Uuid,
    pub new_end_date: DateTime<Utc>,
    pub additional_days: i64,
    pub additional_price: Decimal,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct ExtensionDecidedEvent {
    pub extension_id: Uuid,
    pub reservation_id: Uuid,
    pub approved: bool,
    pub reason: Option<String>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SettlementEvent {
    pub reservation_id: Uuid,
    pub event_type: String,
    pub amount: Decimal,
    pub currency: String,
    pub timestamp: i64,
}

/// Envelope handed to the notifier. The `type` tag doubles as the topic key.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RentalEvent {
    ReservationCreated(ReservationCreatedEvent),
    ReservationStatusChanged(ReservationStatusChangedEvent),
    ExtensionRequested(ExtensionRequestedEvent),
    ExtensionDecided(ExtensionDecidedEvent),
    Settlement(SettlementEvent),
}

impl RentalEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RentalEvent::ReservationCreated(_) => "reservation_created",
            RentalEvent::ReservationStatusChanged(_) => "reservation_status_changed",
            RentalEvent::ExtensionRequested(_) => "extension_requested",
            RentalEvent::ExtensionDecided(_) => "extension_decided",
            RentalEvent::Settlement(_) => "settlement",
        }
    }

    pub fn reservation_id(&self) -> Uuid {
        match self {
            RentalEvent::ReservationCreated(e) => e.reservation_id,
            RentalEvent::ReservationStatusChanged(e) => e.reservation_id,
            RentalEvent::ExtensionRequested(e) => e.reservation_id,
            RentalEvent::ExtensionDecided(e) => e.reservation_id,
            RentalEvent::Settlement(e) => e.reservation_id,
        }
    }
}
