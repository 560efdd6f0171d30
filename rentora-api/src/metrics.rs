//! Prometheus counters for the booking flow, scraped from `GET /metrics`.

use axum::{extract::State, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::{error::AppError, state::AppState};

#[derive(Clone)]
pub struct ApiMetrics {
    registry: Registry,
    pub reservations_created: IntCounter,
    pub booking_conflicts: IntCounter,
    pub reservations_reaped: IntCounter,
    /// Labeled by `action` (confirm, start, complete, cancel).
    pub lifecycle_transitions: IntCounterVec,
}

impl ApiMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reservations_created = IntCounter::new(
            "rentora_reservations_created_total",
            "Reservations created (replays excluded)",
        )?;
        registry.register(Box::new(reservations_created.clone()))?;

        let booking_conflicts = IntCounter::new(
            "rentora_booking_conflicts_total",
            "Create, confirm or extension requests rejected for overlapping an active reservation",
        )?;
        registry.register(Box::new(booking_conflicts.clone()))?;

        let reservations_reaped = IntCounter::new(
            "rentora_reservations_reaped_total",
            "Stale PENDING reservations purged",
        )?;
        registry.register(Box::new(reservations_reaped.clone()))?;

        let lifecycle_transitions = IntCounterVec::new(
            Opts::new(
                "rentora_lifecycle_transitions_total",
                "Reservation status transitions applied through the API",
            ),
            &["action"],
        )?;
        registry.register(Box::new(lifecycle_transitions.clone()))?;

        Ok(Self {
            registry,
            reservations_created,
            booking_conflicts,
            reservations_reaped,
            lifecycle_transitions,
        })
    }

    pub fn transition(&self, action: &str) {
        self.lifecycle_transitions.with_label_values(&[action]).inc();
    }

    pub fn reaped(&self, count: usize) {
        if count > 0 {
            self.reservations_reaped.inc_by(count as u64);
        }
    }

    /// Text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/metrics", get(scrape))
}

async fn scrape(State(state): State<AppState>) -> Result<String, AppError> {
    Ok(state.metrics.encode()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_show_up_in_exposition() {
        let metrics = ApiMetrics::new().unwrap();
        metrics.reservations_created.inc();
        metrics.transition("confirm");
        metrics.transition("confirm");
        metrics.reaped(0);
        metrics.reaped(3);

        let text = metrics.encode().unwrap();
        assert!(text.contains("rentora_reservations_created_total 1"));
        assert!(text.contains("rentora_lifecycle_transitions_total{action=\"confirm\"} 2"));
        assert!(text.contains("rentora_reservations_reaped_total 3"));
    }
}
