pub mod app_config;
pub mod database;
pub mod memory;
pub mod reservation_repo;
pub mod redis_repo;
#[cfg(feature = "kafka")]
pub mod events;

pub use database::{DatabaseError, DbClient};
pub use memory::MemoryStore;
pub use reservation_repo::PgStore;
pub use redis_repo::RedisClient;
#[cfg(feature = "kafka")]
pub use events::{EventProducer, KafkaNotifier};

use rentora_core::repository::{AvailabilityGuard, StoreError, StoreResult};
use rentora_core::Reservation;
use rentora_catalog::{ActiveBooking, Availability, DateRange};
use uuid::Uuid;

/// Run the conflict detector for `range` against `active`, skipping `exclude`
/// (the reservation being extended).
pub(crate) fn ensure_available<'a>(
    guard: &AvailabilityGuard,
    range: &DateRange,
    quantity: u32,
    active: impl IntoIterator<Item = &'a Reservation>,
    exclude: Option<Uuid>,
) -> StoreResult<()> {
    let bookings: Vec<ActiveBooking> = active
        .into_iter()
        .filter(|r| r.status.is_active() && Some(r.id) != exclude)
        .map(Reservation::as_active_booking)
        .collect();

    match guard.detector.check(range, quantity, guard.capacity, &bookings) {
        Availability::Available => Ok(()),
        Availability::Conflict { reservation_ids } => Err(StoreError::Conflict(reservation_ids)),
    }
}
