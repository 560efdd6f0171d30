use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How the security deposit is derived for a listing.
///
/// `Fixed` is a per-unit amount, `Percentage` is applied to the rental subtotal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositPolicy {
    Fixed(Decimal),
    Percentage(Decimal),
}

impl Default for DepositPolicy {
    fn default() -> Self {
        DepositPolicy::Fixed(Decimal::ZERO)
    }
}

/// Whether the owner offers delivery and what it costs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DeliveryPolicy {
    pub available: bool,
    pub flat_fee: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryOption {
    #[default]
    Pickup,
    Delivery,
}

impl DeliveryOption {
    pub fn is_delivery(&self) -> bool {
        matches!(self, DeliveryOption::Delivery)
    }
}

/// Availability context of a listing, as supplied by the catalog.
/// The booking engine only ever reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemListing {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub daily_rate: Decimal,
    /// How many units can be out on rent at the same time.
    pub capacity: u32,
    pub deposit_policy: DepositPolicy,
    pub delivery: DeliveryPolicy,
    pub instant_book: bool,
    pub is_active: bool,
}

impl ItemListing {
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>, daily_rate: Decimal) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            title: title.into(),
            daily_rate,
            capacity: 1,
            deposit_policy: DepositPolicy::default(),
            delivery: DeliveryPolicy::default(),
            instant_book: false,
            is_active: true,
        }
    }

    pub fn with_deposit(mut self, policy: DepositPolicy) -> Self {
        self.deposit_policy = policy;
        self
    }

    pub fn with_delivery(mut self, flat_fee: Decimal) -> Self {
        self.delivery = DeliveryPolicy { available: true, flat_fee };
        self
    }

    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn instant(mut self) -> Self {
        self.instant_book = true;
        self
    }

    /// Delivery may only be selected when the owner offers it.
    pub fn supports(&self, option: DeliveryOption) -> bool {
        match option {
            DeliveryOption::Pickup => true,
            DeliveryOption::Delivery => self.delivery.available,
        }
    }
}
