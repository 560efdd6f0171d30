use chrono::{DateTime, Utc};
use rentora_catalog::{
    ActiveBooking, DateRange, DeliveryOption, DepositPolicy, ItemListing, PriceQuote, PricingInput,
};
use rentora_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Reservation status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
}

impl ReservationStatus {
    /// Statuses that occupy the calendar.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Confirmed | ReservationStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::InProgress => "IN_PROGRESS",
            ReservationStatus::Completed => "COMPLETED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ReservationStatus::Pending),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "IN_PROGRESS" => Ok(ReservationStatus::InProgress),
            "COMPLETED" => Ok(ReservationStatus::Completed),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            other => Err(format!("unknown reservation status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactDetails {
    pub full_name: String,
    pub phone: Masked<String>,
    pub email: Masked<String>,
}

impl ContactDetails {
    /// Names of required fields that are missing or blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.full_name.trim().is_empty() {
            missing.push("full_name");
        }
        if self.phone.is_blank() {
            missing.push("phone");
        }
        if self.email.is_blank() {
            missing.push("email");
        }
        missing
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DeliveryDetails {
    pub option: DeliveryOption,
    pub address: Option<Masked<String>>,
}

/// One rental of one item by one renter over `[start_date, end_date)`.
///
/// Monetary fields are always the output of the pricing calculator applied to
/// the reservation's own rate, duration, quantity and policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub item_id: Uuid,
    pub renter_id: String,
    pub owner_id: String,
    pub quantity: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_days: i64,
    pub daily_rate: Decimal,
    pub deposit_policy: DepositPolicy,
    pub subtotal: Decimal,
    pub service_fee: Decimal,
    pub delivery_fee: Decimal,
    pub deposit_amount: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: ReservationStatus,
    pub delivery: DeliveryDetails,
    pub contact: ContactDetails,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Build a PENDING reservation from a priced quote.
    #[allow(clippy::too_many_arguments)]
    pub fn pending(
        item: &ItemListing,
        renter_id: String,
        range: DateRange,
        quantity: u32,
        quote: &PriceQuote,
        delivery: DeliveryDetails,
        contact: ContactDetails,
        currency: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            item_id: item.id,
            renter_id,
            owner_id: item.owner_id.clone(),
            quantity,
            start_date: range.start,
            end_date: range.end,
            duration_days: quote.duration_days,
            daily_rate: item.daily_rate,
            deposit_policy: item.deposit_policy,
            subtotal: quote.subtotal,
            service_fee: quote.service_fee,
            delivery_fee: quote.delivery_fee,
            deposit_amount: quote.deposit,
            total_amount: quote.total,
            currency,
            status: ReservationStatus::Pending,
            delivery,
            contact,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    pub fn range(&self) -> DateRange {
        DateRange {
            start: self.start_date,
            end: self.end_date,
        }
    }

    pub fn as_active_booking(&self) -> ActiveBooking {
        ActiveBooking {
            reservation_id: self.id,
            range: self.range(),
            quantity: self.quantity,
        }
    }

    /// Pricing input for this reservation stretched to `duration_days`.
    pub fn pricing_input(&self, duration_days: i64, delivery_flat_fee: Decimal) -> PricingInput {
        PricingInput {
            daily_rate: self.daily_rate,
            duration_days,
            quantity: self.quantity,
            deposit_policy: self.deposit_policy,
            delivery_selected: self.delivery.option.is_delivery(),
            delivery_flat_fee,
        }
    }

    /// Update status and stamp the matching transition timestamp.
    pub fn transition(&mut self, to: ReservationStatus, at: DateTime<Utc>) {
        self.status = to;
        self.updated_at = at;
        match to {
            ReservationStatus::Confirmed => self.confirmed_at = Some(at),
            ReservationStatus::InProgress => self.started_at = Some(at),
            ReservationStatus::Completed => self.completed_at = Some(at),
            ReservationStatus::Cancelled => self.cancelled_at = Some(at),
            ReservationStatus::Pending => {}
        }
    }

    /// Move the end date and take over a recomputed quote.
    pub fn apply_extension(&mut self, new_end: DateTime<Utc>, quote: &PriceQuote, at: DateTime<Utc>) {
        self.end_date = new_end;
        self.duration_days = quote.duration_days;
        self.subtotal = quote.subtotal;
        self.service_fee = quote.service_fee;
        self.delivery_fee = quote.delivery_fee;
        self.total_amount = quote.total;
        self.updated_at = at;
    }
}

/// Sub-state of an extension request, independent of the parent reservation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExtensionStatus {
    Pending,
    Approved,
    Rejected,
}

impl ExtensionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtensionStatus::Pending => "PENDING",
            ExtensionStatus::Approved => "APPROVED",
            ExtensionStatus::Rejected => "REJECTED",
        }
    }
}

impl FromStr for ExtensionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ExtensionStatus::Pending),
            "APPROVED" => Ok(ExtensionStatus::Approved),
            "REJECTED" => Ok(ExtensionStatus::Rejected),
            other => Err(format!("unknown extension status: {}", other)),
        }
    }
}

/// Proposal to move a reservation's end date later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtensionRequest {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub requested_by: String,
    /// Parent end date when the request was made
    pub current_end_date: DateTime<Utc>,
    pub new_end_date: DateTime<Utc>,
    pub additional_days: i64,
    /// Rental price difference (subtotal only)
    pub additional_price: Decimal,
    /// Difference in total amount, fees included
    pub additional_total: Decimal,
    pub status: ExtensionStatus,
    pub decision_reason: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

/// Payment status as tracked by the settlement ledger.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    Completed,
    /// A refund was claimed and the processor call is in flight.
    Refunding,
    Refunded,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Completed => "COMPLETED",
            PaymentState::Refunding => "REFUNDING",
            PaymentState::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for PaymentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COMPLETED" => Ok(PaymentState::Completed),
            "REFUNDING" => Ok(PaymentState::Refunding),
            "REFUNDED" => Ok(PaymentState::Refunded),
            other => Err(format!("unknown payment state: {}", other)),
        }
    }
}

/// Ledger entry for the money captured on one reservation.
///
/// Once released, `deposit_retained + deposit_refundable == deposit_amount`,
/// and `deposit_released` never goes back to false.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub reservation_id: Uuid,
    pub payment_reference: String,
    pub currency: String,
    pub captured_amount: Decimal,
    pub platform_fee: Decimal,
    pub processing_fee: Decimal,
    pub deposit_amount: Decimal,
    pub deposit_hold: bool,
    pub deposit_released: bool,
    pub deposit_retained: Decimal,
    pub deposit_refundable: Decimal,
    pub retention_reason: Option<String>,
    pub payout_amount: Option<Decimal>,
    pub refund_amount: Decimal,
    pub refund_reason: Option<String>,
    pub payment_state: PaymentState,
    pub captured_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SettlementRecord {
    /// Owner payout: what was captured minus platform and processing fees.
    pub fn payout(&self) -> Decimal {
        self.captured_amount - self.platform_fee - self.processing_fee
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rentora_catalog::PricingEngine;
    use rust_decimal_macros::dec;

    fn contact() -> ContactDetails {
        ContactDetails {
            full_name: "Ada Renter".to_string(),
            phone: Masked::new("+1 555 0100".to_string()),
            email: Masked::new("ada@example.com".to_string()),
        }
    }

    #[test]
    fn test_missing_contact_fields() {
        let mut details = contact();
        assert!(details.missing_fields().is_empty());

        details.full_name = " ".to_string();
        details.email = Masked::new(String::new());
        assert_eq!(details.missing_fields(), vec!["full_name", "email"]);
    }

    #[test]
    fn test_transition_stamps_timestamps() {
        let item = ItemListing::new("owner-1", "Tent", dec!(20));
        let start = Utc::now();
        let range = DateRange::new(start, start + Duration::days(2)).unwrap();
        let quote = PricingEngine::default()
            .quote(&PricingInput {
                daily_rate: item.daily_rate,
                duration_days: 2,
                quantity: 1,
                deposit_policy: item.deposit_policy,
                delivery_selected: false,
                delivery_flat_fee: Decimal::ZERO,
            })
            .unwrap();

        let mut reservation = Reservation::pending(
            &item,
            "renter-1".to_string(),
            range,
            1,
            &quote,
            DeliveryDetails::default(),
            contact(),
            "USD".to_string(),
            start,
        );
        assert_eq!(reservation.status, ReservationStatus::Pending);
        assert_eq!(reservation.total_amount, dec!(42));

        let later = start + Duration::minutes(5);
        reservation.transition(ReservationStatus::Confirmed, later);
        assert_eq!(reservation.confirmed_at, Some(later));
        assert!(reservation.status.is_active());

        reservation.transition(ReservationStatus::Cancelled, later);
        assert_eq!(reservation.cancelled_at, Some(later));
        assert!(!reservation.status.is_active());
    }
}
