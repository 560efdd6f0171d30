use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::item::DepositPolicy;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Everything the calculator needs for one quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingInput {
    /// Price per unit per day
    pub daily_rate: Decimal,

    /// Whole rental days, see [`duration_days`]
    pub duration_days: i64,

    /// Units rented, at least 1
    pub quantity: u32,

    pub deposit_policy: DepositPolicy,

    /// Renter asked for delivery
    pub delivery_selected: bool,

    /// Flat delivery fee charged once per reservation
    pub delivery_flat_fee: Decimal,
}

/// Itemized amounts. Every line is rounded to cents on its own.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriceQuote {
    pub duration_days: i64,
    pub subtotal: Decimal,
    pub service_fee: Decimal,
    pub delivery_fee: Decimal,
    pub deposit: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Platform service fee, percent of subtotal
    pub service_fee_percent: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            service_fee_percent: Decimal::new(5, 0),
        }
    }
}

/// Deterministic rental pricing.
pub struct PricingEngine {
    config: PricingConfig,
}

impl PricingEngine {
    pub fn new(config: PricingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    /// Quote a rental. Rounding happens after each step, not only on the total,
    /// so totals match what renters were shown line by line.
    pub fn quote(&self, input: &PricingInput) -> Result<PriceQuote, PricingError> {
        Self::validate(input)?;

        let quantity = Decimal::from(input.quantity);
        let subtotal = round_money(input.daily_rate * Decimal::from(input.duration_days) * quantity);
        let service_fee = self.service_fee(subtotal);
        let delivery_fee = if input.delivery_selected {
            input.delivery_flat_fee
        } else {
            Decimal::ZERO
        };
        let deposit = match input.deposit_policy {
            DepositPolicy::Fixed(per_unit) => round_money(per_unit * quantity),
            DepositPolicy::Percentage(percent) => round_money(subtotal * percent / Decimal::ONE_HUNDRED),
        };

        Ok(PriceQuote {
            duration_days: input.duration_days,
            subtotal,
            service_fee,
            delivery_fee,
            deposit,
            total: round_money(subtotal + service_fee + delivery_fee + deposit),
        })
    }

    /// Re-quote an existing reservation whose deposit is already held.
    /// Used by extensions: the rental part is recomputed, the deposit is not.
    pub fn requote_with_held_deposit(
        &self,
        input: &PricingInput,
        held_deposit: Decimal,
    ) -> Result<PriceQuote, PricingError> {
        let mut quote = self.quote(input)?;
        quote.deposit = held_deposit;
        quote.total = round_money(quote.subtotal + quote.service_fee + quote.delivery_fee + held_deposit);
        Ok(quote)
    }

    fn service_fee(&self, subtotal: Decimal) -> Decimal {
        round_money(subtotal * self.config.service_fee_percent / Decimal::ONE_HUNDRED)
    }

    fn validate(input: &PricingInput) -> Result<(), PricingError> {
        if input.duration_days <= 0 {
            return Err(PricingError::InvalidDuration(input.duration_days));
        }
        if input.quantity == 0 {
            return Err(PricingError::InvalidQuantity);
        }
        if input.daily_rate.is_sign_negative() || input.delivery_flat_fee.is_sign_negative() {
            return Err(PricingError::NegativeAmount);
        }
        let deposit_value = match input.deposit_policy {
            DepositPolicy::Fixed(v) | DepositPolicy::Percentage(v) => v,
        };
        if deposit_value.is_sign_negative() {
            return Err(PricingError::NegativeAmount);
        }
        Ok(())
    }
}

impl Default for PricingEngine {
    fn default() -> Self {
        Self::new(PricingConfig::default())
    }
}

/// Round half away from zero to 2 decimal places.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Billable days between two instants: any started day counts as a full day.
/// Zero or negative spans yield `<= 0`, which the calculator rejects.
pub fn duration_days(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let millis = (end - start).num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PricingError {
    #[error("Rental duration must be at least one day, got {0}")]
    InvalidDuration(i64),

    #[error("Quantity must be at least 1")]
    InvalidQuantity,

    #[error("Rates, fees and deposits cannot be negative")]
    NegativeAmount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn input(rate: Decimal, days: i64, quantity: u32, deposit: DepositPolicy) -> PricingInput {
        PricingInput {
            daily_rate: rate,
            duration_days: days,
            quantity,
            deposit_policy: deposit,
            delivery_selected: false,
            delivery_flat_fee: dec!(25),
        }
    }

    #[test]
    fn test_fixed_deposit_quote() {
        let engine = PricingEngine::default();
        let quote = engine
            .quote(&input(dec!(200), 3, 1, DepositPolicy::Fixed(dec!(500))))
            .unwrap();

        assert_eq!(quote.subtotal, dec!(600));
        assert_eq!(quote.service_fee, dec!(30));
        assert_eq!(quote.delivery_fee, dec!(0));
        assert_eq!(quote.deposit, dec!(500));
        assert_eq!(quote.total, dec!(1130));
    }

    #[test]
    fn test_fixed_deposit_scales_with_quantity() {
        let engine = PricingEngine::default();
        let quote = engine
            .quote(&input(dec!(10), 2, 3, DepositPolicy::Fixed(dec!(40.5))))
            .unwrap();

        assert_eq!(quote.subtotal, dec!(60));
        assert_eq!(quote.deposit, dec!(121.5));
    }

    #[test]
    fn test_percentage_deposit_and_delivery() {
        let engine = PricingEngine::default();
        let mut req = input(dec!(33.33), 3, 1, DepositPolicy::Percentage(dec!(12.5)));
        req.delivery_selected = true;
        let quote = engine.quote(&req).unwrap();

        // 99.99 * 0.05 = 4.9995 -> 5.00 ; 99.99 * 12.5% = 12.49875 -> 12.50
        assert_eq!(quote.subtotal, dec!(99.99));
        assert_eq!(quote.service_fee, dec!(5.00));
        assert_eq!(quote.delivery_fee, dec!(25));
        assert_eq!(quote.deposit, dec!(12.50));
        assert_eq!(quote.total, dec!(142.49));
    }

    #[test]
    fn test_rounding_happens_per_step() {
        let engine = PricingEngine::default();
        // fee 0.0075 -> 0.01, deposit 0.0045 -> 0.00
        let quote = engine
            .quote(&input(dec!(0.15), 1, 1, DepositPolicy::Percentage(dec!(3))))
            .unwrap();
        assert_eq!(quote.service_fee, dec!(0.01));
        assert_eq!(quote.deposit, dec!(0.00));
        assert_eq!(quote.total, dec!(0.16));
    }

    #[test]
    fn test_quote_is_deterministic_and_monotonic() {
        let engine = PricingEngine::default();
        let policy = DepositPolicy::Percentage(dec!(20));

        let mut last_total = Decimal::ZERO;
        for days in 1..=30 {
            let a = engine.quote(&input(dec!(17.99), days, 2, policy)).unwrap();
            let b = engine.quote(&input(dec!(17.99), days, 2, policy)).unwrap();
            assert_eq!(a, b);
            assert!(a.total >= last_total);
            last_total = a.total;
        }

        let mut last_total = Decimal::ZERO;
        for quantity in 1..=10 {
            let q = engine.quote(&input(dec!(17.99), 4, quantity, DepositPolicy::Fixed(dec!(50)))).unwrap();
            assert!(q.total >= last_total);
            last_total = q.total;
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let engine = PricingEngine::default();
        let policy = DepositPolicy::Fixed(dec!(0));

        assert_eq!(
            engine.quote(&input(dec!(10), 0, 1, policy)),
            Err(PricingError::InvalidDuration(0))
        );
        assert_eq!(
            engine.quote(&input(dec!(10), 1, 0, policy)),
            Err(PricingError::InvalidQuantity)
        );
        assert_eq!(
            engine.quote(&input(dec!(-1), 1, 1, policy)),
            Err(PricingError::NegativeAmount)
        );
    }

    #[test]
    fn test_requote_keeps_held_deposit() {
        let engine = PricingEngine::default();
        let req = input(dec!(200), 8, 1, DepositPolicy::Percentage(dec!(50)));
        let quote = engine.requote_with_held_deposit(&req, dec!(300)).unwrap();

        assert_eq!(quote.subtotal, dec!(1600));
        assert_eq!(quote.service_fee, dec!(80));
        assert_eq!(quote.deposit, dec!(300));
        assert_eq!(quote.total, dec!(1980));
    }

    #[test]
    fn test_duration_days_rounds_up_partial_days() {
        let start = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();

        assert_eq!(duration_days(start, start + Duration::days(3)), 3);
        assert_eq!(duration_days(start, start + Duration::days(3) + Duration::milliseconds(1)), 4);
        assert_eq!(duration_days(start, start + Duration::hours(2)), 1);
        assert_eq!(duration_days(start, start), 0);
        assert_eq!(duration_days(start, start - Duration::days(1)), 0);
    }
}
