use chrono::Utc;
use rentora_core::notifier::Notifier;
use rentora_core::{ExtensionRequest, Reservation, ReservationStatus, SettlementRecord};
use rentora_shared::models::events::{
    ExtensionDecidedEvent, ExtensionRequestedEvent, ReservationCreatedEvent,
    ReservationStatusChangedEvent, SettlementEvent,
};
use rentora_shared::RentalEvent;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::warn;

/// Best-effort fan-out on a background task. A failed or stalled send is
/// logged and dropped; it never holds up or fails the caller.
#[derive(Clone)]
pub struct Notifications {
    notifier: Arc<dyn Notifier>,
}

impl Notifications {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn send(&self, event: RentalEvent, recipients: &[&str]) {
        let notifier = self.notifier.clone();
        let recipients: Vec<String> = recipients.iter().map(|r| r.to_string()).collect();
        tokio::spawn(async move {
            for recipient in &recipients {
                if let Err(e) = notifier.send(&event, recipient).await {
                    warn!(
                        event = event.name(),
                        reservation_id = %event.reservation_id(),
                        error = %e,
                        "Notification dropped"
                    );
                }
            }
        });
    }
}

pub fn reservation_created(r: &Reservation) -> RentalEvent {
    RentalEvent::ReservationCreated(ReservationCreatedEvent {
        reservation_id: r.id,
        item_id: r.item_id,
        renter_id: r.renter_id.clone(),
        owner_id: r.owner_id.clone(),
        start_date: r.start_date,
        end_date: r.end_date,
        total_amount: r.total_amount,
        timestamp: Utc::now().timestamp(),
    })
}

pub fn status_changed(
    r: &Reservation,
    from: ReservationStatus,
    actor_id: &str,
    reason: Option<String>,
) -> RentalEvent {
    RentalEvent::ReservationStatusChanged(ReservationStatusChangedEvent {
        reservation_id: r.id,
        from_status: from.to_string(),
        to_status: r.status.to_string(),
        actor_id: actor_id.to_string(),
        reason,
        timestamp: Utc::now().timestamp(),
    })
}

pub fn extension_requested(e: &ExtensionRequest) -> RentalEvent {
    RentalEvent::ExtensionRequested(ExtensionRequestedEvent {
        extension_id: e.id,
        reservation_id: e.reservation_id,
        new_end_date: e.new_end_date,
        additional_days: e.additional_days,
        additional_price: e.additional_price,
        timestamp: Utc::now().timestamp(),
    })
}

pub fn extension_decided(e: &ExtensionRequest, approved: bool) -> RentalEvent {
    RentalEvent::ExtensionDecided(ExtensionDecidedEvent {
        extension_id: e.id,
        reservation_id: e.reservation_id,
        approved,
        reason: e.decision_reason.clone(),
        timestamp: Utc::now().timestamp(),
    })
}

pub fn settlement(record: &SettlementRecord, event_type: &str, amount: Decimal) -> RentalEvent {
    RentalEvent::Settlement(SettlementEvent {
        reservation_id: record.reservation_id,
        event_type: event_type.to_string(),
        amount,
        currency: record.currency.clone(),
        timestamp: Utc::now().timestamp(),
    })
}
