use chrono::{Duration, TimeZone, Utc};
use rentora_catalog::{duration_days, round_money, DepositPolicy, PricingEngine, PricingInput};
use rust_decimal_macros::dec;

#[test]
fn test_day_and_money_helpers_are_exported_at_crate_root() {
    let start = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
    let end = start + Duration::days(2) + Duration::hours(1);

    assert_eq!(duration_days(start, end), 3);
    assert_eq!(round_money(dec!(10.005)), dec!(10.01));
    assert_eq!(round_money(dec!(-10.005)), dec!(-10.01));
}

#[test]
fn test_root_exports_price_a_rental_end_to_end() {
    let start = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
    let days = duration_days(start, start + Duration::days(4));

    let quote = PricingEngine::default()
        .quote(&PricingInput {
            daily_rate: dec!(25),
            duration_days: days,
            quantity: 1,
            deposit_policy: DepositPolicy::Fixed(dec!(0)),
            delivery_selected: false,
            delivery_flat_fee: dec!(0),
        })
        .unwrap();

    assert_eq!(quote.subtotal, dec!(100));
    assert_eq!(quote.total, dec!(105));
}
