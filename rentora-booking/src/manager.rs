use chrono::{DateTime, Utc};
use rentora_catalog::{
    duration_days, Availability, ConflictDetector, DateRange, DeliveryOption, ItemListing, PricingEngine,
    PricingInput,
};
use rentora_core::payment::{PaymentIntent, PaymentStatus};
use rentora_core::repository::{
    AvailabilityGuard, IdempotencyStore, ItemCatalog, ReservationRepository, SettlementRepository,
};
use rentora_core::{
    Actor, ContactDetails, DeliveryDetails, Party, PaymentState, Reservation, ReservationStatus,
    SettlementRecord,
};
use rentora_shared::Masked;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::notify::{self, Notifications};
use crate::orchestrator::{PaymentDescriptor, PaymentOrchestrator};
use crate::reaper::StaleReservationReaper;
use crate::settlement::SettlementLedger;
use crate::Ports;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Confirm,
    Start,
    Complete,
    Cancel,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Confirm => "confirm",
            LifecycleAction::Start => "start",
            LifecycleAction::Complete => "complete",
            LifecycleAction::Cancel => "cancel",
        }
    }

    /// Statuses the action may be applied from.
    fn sources(&self) -> &'static [ReservationStatus] {
        match self {
            LifecycleAction::Confirm => &[ReservationStatus::Pending],
            LifecycleAction::Start => &[ReservationStatus::Confirmed],
            LifecycleAction::Complete => &[ReservationStatus::InProgress],
            LifecycleAction::Cancel => &[ReservationStatus::Pending, ReservationStatus::Confirmed],
        }
    }

    fn target(&self) -> ReservationStatus {
        match self {
            LifecycleAction::Confirm => ReservationStatus::Confirmed,
            LifecycleAction::Start => ReservationStatus::InProgress,
            LifecycleAction::Complete => ReservationStatus::Completed,
            LifecycleAction::Cancel => ReservationStatus::Cancelled,
        }
    }

    fn allowed(&self) -> &'static [Party] {
        match self {
            // System confirms instant-book reservations on payment capture.
            LifecycleAction::Confirm => &[Party::Owner, Party::Admin, Party::System],
            LifecycleAction::Start | LifecycleAction::Complete => &[Party::Owner, Party::Admin],
            // System cancels an instant-book capture whose dates were taken meanwhile.
            LifecycleAction::Cancel => &[Party::Renter, Party::Admin, Party::System],
        }
    }
}

/// Input of `create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReservation {
    pub item_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub delivery_option: DeliveryOption,
    pub delivery_address: Option<Masked<String>>,
    pub contact: ContactDetails,
    /// Client-supplied retry key; replays return the reservation it produced.
    #[serde(skip)]
    pub idempotency_key: Option<String>,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedReservation {
    pub reservation: Reservation,
    pub payment: PaymentDescriptor,
    /// True when an idempotency key matched an earlier create.
    pub replayed: bool,
    #[serde(skip)]
    pub reaped: usize,
}

/// Result of handling a capture notification from the payment processor.
#[derive(Debug, Clone)]
pub enum CaptureOutcome {
    /// Ledger record opened (or already open); reservation possibly auto-confirmed.
    Settled {
        reservation: Reservation,
        settlement: SettlementRecord,
    },
    /// The reservation is gone, cancelled, or lost its dates; the money was handed back.
    Refunded { reservation_id: Uuid, amount: Decimal },
    /// The processor reports the payment did not go through.
    NotCaptured { reservation_id: Uuid, status: PaymentStatus },
}

/// Drives reservations through PENDING → CONFIRMED → IN_PROGRESS → COMPLETED,
/// with CANCELLED reachable from PENDING and CONFIRMED.
///
/// Every transition is a compare-and-set on the status read at the start of
/// the call; losing a race surfaces as [`BookingError::State`].
pub struct ReservationManager {
    catalog: Arc<dyn ItemCatalog>,
    reservations: Arc<dyn ReservationRepository>,
    settlements: Arc<dyn SettlementRepository>,
    idempotency: Arc<dyn IdempotencyStore>,
    reaper: StaleReservationReaper,
    ledger: Arc<SettlementLedger>,
    payments: Arc<PaymentOrchestrator>,
    notifications: Notifications,
    pricing: Arc<PricingEngine>,
    detector: ConflictDetector,
    currency: String,
    idempotency_ttl_seconds: u64,
}

impl ReservationManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ports: &Ports,
        reaper: StaleReservationReaper,
        ledger: Arc<SettlementLedger>,
        payments: Arc<PaymentOrchestrator>,
        notifications: Notifications,
        pricing: Arc<PricingEngine>,
        detector: ConflictDetector,
        currency: String,
        idempotency_ttl_seconds: u64,
    ) -> Self {
        Self {
            catalog: ports.catalog.clone(),
            reservations: ports.reservations.clone(),
            settlements: ports.settlements.clone(),
            idempotency: ports.idempotency.clone(),
            reaper,
            ledger,
            payments,
            notifications,
            pricing,
            detector,
            currency,
            idempotency_ttl_seconds,
        }
    }

    pub async fn create(&self, actor: &Actor, req: CreateReservation) -> BookingResult<CreatedReservation> {
        let range = Self::validate(&req)?;

        let reservation_id = Uuid::new_v4();
        let claim_key = req.idempotency_key.as_deref().map(|key| {
            format!(
                "{}:{}:{}:{}:{}",
                actor.id,
                req.item_id,
                range.start.timestamp_millis(),
                range.end.timestamp_millis(),
                key
            )
        });
        if let Some(key) = &claim_key {
            if let Some(existing) = self
                .idempotency
                .claim(key, reservation_id, self.idempotency_ttl_seconds)
                .await?
            {
                return self.replay(actor, existing).await;
            }
        }

        let result = self.create_claimed(actor, req, range, reservation_id).await;
        if result.is_err() {
            if let Some(key) = &claim_key {
                if let Err(e) = self.idempotency.release(key).await {
                    warn!("Failed to release idempotency key {}: {}", key, e);
                }
            }
        }
        result
    }

    async fn create_claimed(
        &self,
        actor: &Actor,
        req: CreateReservation,
        range: DateRange,
        reservation_id: Uuid,
    ) -> BookingResult<CreatedReservation> {
        // Opportunistic cleanup so abandoned checkouts never linger past the TTL.
        let reaped = match self.reaper.sweep().await {
            Ok(ids) => ids.len(),
            Err(e) => {
                warn!("Reaper sweep before create failed: {}", e);
                0
            }
        };

        let item = self
            .catalog
            .get_item(req.item_id)
            .await?
            .filter(|i| i.is_active)
            .ok_or_else(|| BookingError::not_found("item", req.item_id))?;

        if !item.supports(req.delivery_option) {
            return Err(BookingError::Validation(format!(
                "item {} does not offer delivery",
                item.id
            )));
        }
        if req.quantity > item.capacity {
            return Err(BookingError::Validation(format!(
                "quantity {} exceeds the item's capacity of {}",
                req.quantity, item.capacity
            )));
        }

        // Early rejection; the store re-checks atomically with the insert.
        let active: Vec<_> = self
            .reservations
            .list_active_for_item(item.id)
            .await?
            .iter()
            .map(Reservation::as_active_booking)
            .collect();
        if let Availability::Conflict { reservation_ids } =
            self.detector.check(&range, req.quantity, item.capacity, &active)
        {
            warn!("Create on item {} rejected, conflicts with {:?}", item.id, reservation_ids);
            return Err(BookingError::Conflict { ids: reservation_ids });
        }

        let quote = self.pricing.quote(&PricingInput {
            daily_rate: item.daily_rate,
            duration_days: duration_days(range.start, range.end),
            quantity: req.quantity,
            deposit_policy: item.deposit_policy,
            delivery_selected: req.delivery_option.is_delivery(),
            delivery_flat_fee: item.delivery.flat_fee,
        })?;

        let delivery = DeliveryDetails {
            option: req.delivery_option,
            address: req.delivery_address.filter(|_| req.delivery_option.is_delivery()),
        };
        let mut reservation = Reservation::pending(
            &item,
            actor.id.clone(),
            range,
            req.quantity,
            &quote,
            delivery,
            req.contact,
            self.currency.clone(),
            Utc::now(),
        );
        reservation.id = reservation_id;

        self.reservations
            .insert_if_available(&reservation, guard(&item, self.detector))
            .await
            .inspect_err(|e| warn!("Insert of reservation {} failed: {}", reservation.id, e))?;

        info!(
            "Reservation {} created for item {} ({} days, total {})",
            reservation.id, item.id, reservation.duration_days, reservation.total_amount
        );

        let payment = self.payments.initialize_payment(&reservation).await.map_err(|e| {
            error!("Payment intent for reservation {} failed: {}", reservation.id, e);
            BookingError::from(e)
        })?;

        self.notifications.send(
            notify::reservation_created(&reservation),
            &[&reservation.renter_id, &reservation.owner_id],
        );

        Ok(CreatedReservation {
            reservation,
            payment,
            replayed: false,
            reaped,
        })
    }

    async fn replay(&self, actor: &Actor, reservation_id: Uuid) -> BookingResult<CreatedReservation> {
        let reservation = self.reservations.get(reservation_id).await?.ok_or_else(|| {
            BookingError::State("a request with this idempotency key is still being processed".into())
        })?;
        if reservation.renter_id != actor.id {
            return Err(BookingError::Authorization("idempotency key belongs to another caller".into()));
        }
        info!("Replaying create for reservation {}", reservation.id);
        let payment = self.payments.initialize_payment(&reservation).await?;
        Ok(CreatedReservation {
            reservation,
            payment,
            replayed: true,
            reaped: 0,
        })
    }

    fn validate(req: &CreateReservation) -> BookingResult<DateRange> {
        let missing = req.contact.missing_fields();
        if !missing.is_empty() {
            return Err(BookingError::Validation(format!(
                "missing contact fields: {}",
                missing.join(", ")
            )));
        }
        if req.quantity == 0 {
            return Err(BookingError::Validation("quantity must be at least 1".into()));
        }
        if req.delivery_option.is_delivery()
            && req.delivery_address.as_ref().map_or(true, |a| a.is_blank())
        {
            return Err(BookingError::Validation("delivery requires an address".into()));
        }
        Ok(DateRange::new(req.start_date, req.end_date)?)
    }

    /// Visible to the renter, the owner, admins and internal callers.
    pub async fn get(&self, actor: &Actor, reservation_id: Uuid) -> BookingResult<Reservation> {
        let reservation = self.load(reservation_id).await?;
        if actor.parties(&reservation.renter_id, &reservation.owner_id).is_empty() {
            return Err(BookingError::Authorization(format!(
                "{} is not a party to reservation {}",
                actor.id, reservation_id
            )));
        }
        Ok(reservation)
    }

    pub async fn apply_action(
        &self,
        actor: &Actor,
        reservation_id: Uuid,
        action: LifecycleAction,
        reason: Option<String>,
    ) -> BookingResult<Reservation> {
        match action {
            LifecycleAction::Confirm => self.confirm(actor, reservation_id).await,
            LifecycleAction::Start => self.start(actor, reservation_id).await,
            LifecycleAction::Complete => self.complete(actor, reservation_id).await,
            LifecycleAction::Cancel => self.cancel(actor, reservation_id, reason).await,
        }
    }

    pub async fn confirm(&self, actor: &Actor, reservation_id: Uuid) -> BookingResult<Reservation> {
        let reservation = self.load(reservation_id).await?;
        self.transition(actor, reservation, LifecycleAction::Confirm, None).await
    }

    /// Only once the rental window has opened.
    pub async fn start(&self, actor: &Actor, reservation_id: Uuid) -> BookingResult<Reservation> {
        let reservation = self.load(reservation_id).await?;
        Self::authorize(actor, &reservation, LifecycleAction::Start)?;
        if Utc::now() < reservation.start_date {
            return Err(BookingError::Validation(format!(
                "reservation {} cannot start before {}",
                reservation.id, reservation.start_date
            )));
        }
        self.transition(actor, reservation, LifecycleAction::Start, None).await
    }

    pub async fn complete(&self, actor: &Actor, reservation_id: Uuid) -> BookingResult<Reservation> {
        let reservation = self.load(reservation_id).await?;
        self.transition(actor, reservation, LifecycleAction::Complete, None).await
    }

    /// Cancels and, when money was captured, refunds all of it through the ledger.
    pub async fn cancel(
        &self,
        actor: &Actor,
        reservation_id: Uuid,
        reason: Option<String>,
    ) -> BookingResult<Reservation> {
        let reservation = self.load(reservation_id).await?;
        let cancelled = self
            .transition(actor, reservation, LifecycleAction::Cancel, reason.clone())
            .await?;

        if let Some(record) = self.settlements.get(reservation_id).await? {
            if record.payment_state == PaymentState::Completed {
                let refund_reason = reason.unwrap_or_else(|| "reservation cancelled".to_string());
                self.ledger
                    .refund_captured(&cancelled, record, None, refund_reason)
                    .await
                    .inspect_err(|e| {
                        error!(
                            "Reservation {} cancelled but the refund failed: {}",
                            reservation_id, e
                        )
                    })?;
            }
        }
        Ok(cancelled)
    }

    /// Payment processor reported a capture for `intent`.
    pub async fn on_payment_captured(&self, intent: &PaymentIntent) -> BookingResult<CaptureOutcome> {
        if intent.status != PaymentStatus::Succeeded {
            info!("Payment {} not captured ({:?})", intent.id, intent.status);
            return Ok(CaptureOutcome::NotCaptured {
                reservation_id: intent.reservation_id,
                status: intent.status,
            });
        }

        let reservation = match self.reservations.get(intent.reservation_id).await? {
            Some(r) if r.status != ReservationStatus::Cancelled => r,
            found => {
                warn!(
                    "Capture {} for {} reservation {}, refunding",
                    intent.id,
                    if found.is_some() { "cancelled" } else { "missing" },
                    intent.reservation_id
                );
                self.payments.refund(&intent.id, intent.amount).await?;
                return Ok(CaptureOutcome::Refunded {
                    reservation_id: intent.reservation_id,
                    amount: intent.amount,
                });
            }
        };

        if intent.amount != reservation.total_amount {
            warn!(
                "Captured {} differs from reservation {} total {}",
                intent.amount, reservation.id, reservation.total_amount
            );
        }

        let settlement = self.ledger.open_hold(&reservation, intent).await?;

        let item = self.catalog.get_item(reservation.item_id).await?;
        let reservation = match item {
            Some(item) if item.instant_book && reservation.status == ReservationStatus::Pending => {
                match self
                    .transition(&Actor::system(), reservation.clone(), LifecycleAction::Confirm, None)
                    .await
                {
                    Ok(confirmed) => confirmed,
                    Err(BookingError::Conflict { ids }) => {
                        warn!(
                            "Instant-book reservation {} overlaps {:?} after capture, cancelling",
                            reservation.id, ids
                        );
                        return self.cancel_unavailable(reservation, settlement).await;
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => reservation,
        };

        Ok(CaptureOutcome::Settled {
            reservation,
            settlement,
        })
    }

    /// The captured reservation's dates were taken by another confirmation:
    /// cancel it and hand the money back.
    async fn cancel_unavailable(
        &self,
        reservation: Reservation,
        settlement: SettlementRecord,
    ) -> BookingResult<CaptureOutcome> {
        let reason = "dates no longer available".to_string();
        let cancelled = self
            .transition(&Actor::system(), reservation, LifecycleAction::Cancel, Some(reason.clone()))
            .await?;
        let refunded = self
            .ledger
            .refund_captured(&cancelled, settlement, None, reason)
            .await?;
        Ok(CaptureOutcome::Refunded {
            reservation_id: cancelled.id,
            amount: refunded.refund_amount,
        })
    }

    /// Webhook entry point: re-reads the intent from the processor instead of
    /// trusting the notification body.
    pub async fn on_payment_event(&self, intent_id: &str) -> BookingResult<CaptureOutcome> {
        let intent = self.payments.verify(intent_id).await?;
        self.on_payment_captured(&intent).await
    }

    async fn load(&self, reservation_id: Uuid) -> BookingResult<Reservation> {
        self.reservations
            .get(reservation_id)
            .await?
            .ok_or_else(|| BookingError::not_found("reservation", reservation_id))
    }

    fn authorize(actor: &Actor, reservation: &Reservation, action: LifecycleAction) -> BookingResult<()> {
        if actor.acts_as_any(action.allowed(), &reservation.renter_id, &reservation.owner_id) {
            Ok(())
        } else {
            Err(BookingError::Authorization(format!(
                "{} may not {} reservation {}",
                actor.id,
                action.as_str(),
                reservation.id
            )))
        }
    }

    async fn transition(
        &self,
        actor: &Actor,
        mut reservation: Reservation,
        action: LifecycleAction,
        reason: Option<String>,
    ) -> BookingResult<Reservation> {
        Self::authorize(actor, &reservation, action)?;

        let from = reservation.status;
        if !action.sources().contains(&from) {
            return Err(BookingError::State(format!(
                "cannot {} a {} reservation",
                action.as_str(),
                from
            )));
        }

        reservation.transition(action.target(), Utc::now());
        if action == LifecycleAction::Cancel {
            reservation.cancellation_reason = reason.clone();
        }

        let written = if action == LifecycleAction::Confirm {
            let item = self
                .catalog
                .get_item(reservation.item_id)
                .await?
                .ok_or_else(|| BookingError::not_found("item", reservation.item_id))?;
            self.reservations
                .confirm_if_available(&reservation, from, guard(&item, self.detector))
                .await
                .inspect_err(|e| warn!("Confirm of reservation {} rejected: {}", reservation.id, e))?
        } else {
            self.reservations.update_if_status(&reservation, from).await?
        };
        if !written {
            warn!(
                "Lost race on reservation {}: {} expected {}",
                reservation.id,
                action.as_str(),
                from
            );
            return Err(BookingError::State(format!(
                "reservation {} is no longer {}",
                reservation.id, from
            )));
        }

        info!(
            "Reservation {} {} -> {} by {}",
            reservation.id, from, reservation.status, actor.id
        );
        self.notifications.send(
            notify::status_changed(&reservation, from, &actor.id, reason),
            &[&reservation.renter_id, &reservation.owner_id],
        );

        Ok(reservation)
    }
}

pub(crate) fn guard(item: &ItemListing, detector: ConflictDetector) -> AvailabilityGuard {
    AvailabilityGuard {
        capacity: item.capacity,
        detector,
    }
}
