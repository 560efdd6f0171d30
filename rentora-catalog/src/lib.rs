pub mod item;
pub mod pricing;
pub mod availability;

pub use item::{DeliveryOption, DeliveryPolicy, DepositPolicy, ItemListing};
pub use pricing::{duration_days, round_money, PriceQuote, PricingConfig, PricingEngine, PricingInput};
pub use availability::{ActiveBooking, Availability, ConflictDetector, DateRange, OverlapPolicy};
