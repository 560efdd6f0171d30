use chrono::{DateTime, Duration, Utc};
use rentora_core::repository::ReservationRepository;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::BookingResult;

/// Purges PENDING reservations that were never paid within the TTL.
///
/// Runs opportunistically before every create and periodically from the API's
/// background sweep. Reservations with a captured payment are never purged.
#[derive(Clone)]
pub struct StaleReservationReaper {
    reservations: Arc<dyn ReservationRepository>,
    ttl: Duration,
}

impl StaleReservationReaper {
    pub fn new(reservations: Arc<dyn ReservationRepository>, ttl: Duration) -> Self {
        Self { reservations, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.ttl
    }

    pub async fn sweep(&self) -> BookingResult<Vec<Uuid>> {
        self.sweep_at(Utc::now()).await
    }

    pub async fn sweep_at(&self, now: DateTime<Utc>) -> BookingResult<Vec<Uuid>> {
        let purged = self.reservations.purge_stale_pending(self.cutoff(now)).await?;
        if !purged.is_empty() {
            info!("Reaped {} stale pending reservations", purged.len());
        }
        Ok(purged)
    }
}
