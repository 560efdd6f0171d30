pub mod models;
pub mod pii;

pub use models::events::RentalEvent;
pub use pii::Masked;
