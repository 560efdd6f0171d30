pub mod identity;
pub mod reservation;
pub mod repository;
pub mod payment;
pub mod notifier;

pub use identity::{Actor, Party, Role};
pub use reservation::{
    ContactDetails, DeliveryDetails, ExtensionRequest, ExtensionStatus, PaymentState, Reservation,
    ReservationStatus, SettlementRecord,
};
pub use repository::{StoreError, StoreResult};
