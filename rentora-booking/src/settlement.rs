use chrono::Utc;
use rentora_catalog::pricing::round_money;
use rentora_core::payment::PaymentIntent;
use rentora_core::repository::{ReservationRepository, SettlementRepository};
use rentora_core::{Actor, Party, PaymentState, Reservation, ReservationStatus, SettlementRecord, StoreError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::notify::{self, Notifications};
use crate::orchestrator::PaymentOrchestrator;

/// Processor charges deducted from the owner's payout when the processor
/// does not report its own fee.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeSchedule {
    pub processing_fee_percent: Decimal,
    pub processing_fee_fixed: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            processing_fee_percent: Decimal::new(29, 1),
            processing_fee_fixed: Decimal::ZERO,
        }
    }
}

impl FeeSchedule {
    pub fn processing_fee(&self, captured: Decimal) -> Decimal {
        round_money(captured * self.processing_fee_percent / Decimal::ONE_HUNDRED + self.processing_fee_fixed)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DepositAction {
    Release,
    Retain,
    Refund,
}

/// Input of `settle`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleDeposit {
    pub action: DepositAction,
    /// Retained amount for `retain`; refunded amount for `refund` (defaults to everything captured)
    pub amount: Option<Decimal>,
    pub reason: Option<String>,
}

/// Money captured per reservation and what happens to the deposit afterwards.
pub struct SettlementLedger {
    reservations: Arc<dyn ReservationRepository>,
    settlements: Arc<dyn SettlementRepository>,
    payments: Arc<PaymentOrchestrator>,
    notifications: Notifications,
    fees: FeeSchedule,
}

impl SettlementLedger {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        settlements: Arc<dyn SettlementRepository>,
        payments: Arc<PaymentOrchestrator>,
        notifications: Notifications,
        fees: FeeSchedule,
    ) -> Self {
        Self {
            reservations,
            settlements,
            payments,
            notifications,
            fees,
        }
    }

    pub fn fees(&self) -> FeeSchedule {
        self.fees
    }

    /// Open the record for a captured payment. Replays return the existing record.
    pub async fn open_hold(
        &self,
        reservation: &Reservation,
        intent: &PaymentIntent,
    ) -> BookingResult<SettlementRecord> {
        let now = Utc::now();
        let processing_fee = intent
            .processor_fee
            .map(round_money)
            .unwrap_or_else(|| self.fees.processing_fee(intent.amount));

        let record = SettlementRecord {
            reservation_id: reservation.id,
            payment_reference: intent.id.clone(),
            currency: intent.currency.clone(),
            captured_amount: intent.amount,
            platform_fee: reservation.service_fee,
            processing_fee,
            deposit_amount: reservation.deposit_amount,
            deposit_hold: true,
            deposit_released: false,
            deposit_retained: Decimal::ZERO,
            deposit_refundable: Decimal::ZERO,
            retention_reason: None,
            payout_amount: None,
            refund_amount: Decimal::ZERO,
            refund_reason: None,
            payment_state: PaymentState::Completed,
            captured_at: now,
            released_at: None,
            refunded_at: None,
            updated_at: now,
        };

        match self.settlements.insert(&record).await {
            Ok(()) => {
                info!(
                    "Settlement opened for reservation {}: captured {} {}, deposit {} held",
                    record.reservation_id, record.captured_amount, record.currency, record.deposit_amount
                );
                self.notifications.send(
                    notify::settlement(&record, "captured", record.captured_amount),
                    &[&reservation.renter_id, &reservation.owner_id],
                );
                Ok(record)
            }
            Err(StoreError::Duplicate(_)) => {
                info!("Capture for reservation {} already recorded", reservation.id);
                self.settlements
                    .get(reservation.id)
                    .await?
                    .ok_or_else(|| BookingError::not_found("settlement", reservation.id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn get(&self, actor: &Actor, reservation_id: Uuid) -> BookingResult<SettlementRecord> {
        let reservation = self.load_reservation(reservation_id).await?;
        if actor.parties(&reservation.renter_id, &reservation.owner_id).is_empty() {
            return Err(BookingError::Authorization(format!(
                "{} is not a party to reservation {}",
                actor.id, reservation_id
            )));
        }
        self.load_record(reservation_id).await
    }

    pub async fn settle(
        &self,
        actor: &Actor,
        reservation_id: Uuid,
        req: SettleDeposit,
    ) -> BookingResult<SettlementRecord> {
        match req.action {
            DepositAction::Release => self.release_deposit(actor, reservation_id).await,
            DepositAction::Retain => {
                let amount = req
                    .amount
                    .ok_or_else(|| BookingError::Validation("retain requires an amount".into()))?;
                let reason = req
                    .reason
                    .filter(|r| !r.trim().is_empty())
                    .ok_or_else(|| BookingError::Validation("retain requires a reason".into()))?;
                self.retain_deposit(actor, reservation_id, amount, reason).await
            }
            DepositAction::Refund => self.refund(actor, reservation_id, req.amount, req.reason).await,
        }
    }

    /// Return the whole deposit and fix the payout.
    pub async fn release_deposit(&self, actor: &Actor, reservation_id: Uuid) -> BookingResult<SettlementRecord> {
        self.close_deposit(actor, reservation_id, Decimal::ZERO, None).await
    }

    /// Keep `amount` of the deposit (damage, late return); the remainder goes back to the renter.
    /// Retaining zero is a full release that still records the reason.
    pub async fn retain_deposit(
        &self,
        actor: &Actor,
        reservation_id: Uuid,
        amount: Decimal,
        reason: String,
    ) -> BookingResult<SettlementRecord> {
        if amount < Decimal::ZERO {
            return Err(BookingError::Validation("retained amount cannot be negative".into()));
        }
        self.close_deposit(actor, reservation_id, amount, Some(reason)).await
    }

    async fn close_deposit(
        &self,
        actor: &Actor,
        reservation_id: Uuid,
        retained: Decimal,
        reason: Option<String>,
    ) -> BookingResult<SettlementRecord> {
        let reservation = self.load_reservation(reservation_id).await?;
        authorize(actor, &reservation, &[Party::Owner, Party::Admin], "settle the deposit of")?;

        if !matches!(
            reservation.status,
            ReservationStatus::Completed | ReservationStatus::Cancelled
        ) {
            return Err(BookingError::State(format!(
                "deposit of a {} reservation cannot be settled yet",
                reservation.status
            )));
        }

        let mut record = self.load_record(reservation_id).await?;
        if record.payment_state != PaymentState::Completed {
            return Err(BookingError::State(format!(
                "payment of reservation {} is {}",
                reservation_id,
                record.payment_state.as_str()
            )));
        }
        if record.deposit_released {
            return Err(BookingError::State(format!(
                "deposit of reservation {} was already released",
                reservation_id
            )));
        }
        let retained = round_money(retained);
        if retained > record.deposit_amount {
            return Err(BookingError::Validation(format!(
                "cannot retain {} of a {} deposit",
                retained, record.deposit_amount
            )));
        }

        let now = Utc::now();
        record.deposit_released = true;
        record.deposit_retained = retained;
        record.deposit_refundable = record.deposit_amount - retained;
        record.retention_reason = reason;
        record.payout_amount = Some(record.payout());
        record.released_at = Some(now);
        record.updated_at = now;

        if !self
            .settlements
            .update_if(&record, PaymentState::Completed, false)
            .await?
        {
            warn!("Settlement of reservation {} changed while releasing", reservation_id);
            return Err(BookingError::State(format!(
                "settlement of reservation {} changed concurrently",
                reservation_id
            )));
        }

        info!(
            "Deposit of reservation {} released by {}: retained {}, refundable {}, payout {}",
            reservation_id, actor.id, record.deposit_retained, record.deposit_refundable, record.payout()
        );
        self.notifications.send(
            notify::settlement(&record, "deposit_released", record.deposit_refundable),
            &[&reservation.renter_id, &reservation.owner_id],
        );

        Ok(record)
    }

    /// Refund captured money and cancel the reservation.
    pub async fn refund(
        &self,
        actor: &Actor,
        reservation_id: Uuid,
        amount: Option<Decimal>,
        reason: Option<String>,
    ) -> BookingResult<SettlementRecord> {
        let reservation = self.load_reservation(reservation_id).await?;
        authorize(actor, &reservation, &[Party::Renter, Party::Admin], "refund")?;

        // CANCELLED is accepted so a cancel whose automatic refund failed can be retried.
        if !matches!(
            reservation.status,
            ReservationStatus::Pending | ReservationStatus::Confirmed | ReservationStatus::Cancelled
        ) {
            return Err(BookingError::State(format!(
                "a {} reservation cannot be refunded",
                reservation.status
            )));
        }

        let record = self.load_record(reservation_id).await?;
        if record.payment_state != PaymentState::Completed {
            return Err(BookingError::State(format!(
                "payment of reservation {} is {}",
                reservation_id,
                record.payment_state.as_str()
            )));
        }
        if let Some(amount) = amount {
            if amount <= Decimal::ZERO || amount > record.captured_amount {
                return Err(BookingError::Validation(format!(
                    "refund must be between 0 and the captured {}",
                    record.captured_amount
                )));
            }
        }

        let reason = reason.unwrap_or_else(|| "refund requested".to_string());
        let reservation = if reservation.status == ReservationStatus::Cancelled {
            reservation
        } else {
            let from = reservation.status;
            let mut cancelled = reservation;
            cancelled.transition(ReservationStatus::Cancelled, Utc::now());
            cancelled.cancellation_reason = Some(reason.clone());
            if !self.reservations.update_if_status(&cancelled, from).await? {
                return Err(BookingError::State(format!(
                    "reservation {} is no longer {}",
                    reservation_id, from
                )));
            }
            info!("Reservation {} {} -> CANCELLED by refund from {}", reservation_id, from, actor.id);
            self.notifications.send(
                notify::status_changed(&cancelled, from, &actor.id, Some(reason.clone())),
                &[&cancelled.renter_id, &cancelled.owner_id],
            );
            cancelled
        };

        self.refund_captured(&reservation, record, amount, reason).await
    }

    /// Hand `amount` (default: everything captured) back through the processor
    /// and mark the payment REFUNDED. Callers have already authorized the refund.
    ///
    /// The record is moved to REFUNDING before the processor is called, so of two
    /// concurrent refunds only the one that wins that compare-and-set reaches it.
    pub(crate) async fn refund_captured(
        &self,
        reservation: &Reservation,
        record: SettlementRecord,
        amount: Option<Decimal>,
        reason: String,
    ) -> BookingResult<SettlementRecord> {
        let amount = round_money(amount.unwrap_or(record.captured_amount));
        let released = record.deposit_released;

        let mut claimed = record.clone();
        claimed.payment_state = PaymentState::Refunding;
        claimed.updated_at = Utc::now();
        if !self
            .settlements
            .update_if(&claimed, PaymentState::Completed, released)
            .await?
        {
            warn!(
                "Refund of settlement {} skipped, it changed concurrently",
                record.reservation_id
            );
            return Err(BookingError::State(format!(
                "settlement of reservation {} changed concurrently",
                record.reservation_id
            )));
        }

        if let Err(e) = self.payments.refund(&record.payment_reference, amount).await {
            error!(
                "Refund of {} for reservation {} failed: {}",
                amount, record.reservation_id, e
            );
            match self
                .settlements
                .update_if(&record, PaymentState::Refunding, released)
                .await
            {
                Ok(true) => {}
                Ok(false) => error!("Settlement {} moved while REFUNDING", record.reservation_id),
                Err(revert) => error!(
                    "Settlement {} left REFUNDING after failed refund: {}",
                    record.reservation_id, revert
                ),
            }
            return Err(e.into());
        }

        let now = Utc::now();
        let mut refunded = claimed;
        refunded.payment_state = PaymentState::Refunded;
        refunded.refund_amount = amount;
        refunded.refund_reason = Some(reason);
        refunded.refunded_at = Some(now);
        refunded.updated_at = now;

        if !self
            .settlements
            .update_if(&refunded, PaymentState::Refunding, released)
            .await?
        {
            error!(
                "Refund of {} issued but settlement {} moved while REFUNDING",
                amount, refunded.reservation_id
            );
            return Err(BookingError::State(format!(
                "settlement of reservation {} changed concurrently",
                refunded.reservation_id
            )));
        }

        info!("Reservation {} refunded {} {}", refunded.reservation_id, amount, refunded.currency);
        self.notifications.send(
            notify::settlement(&refunded, "refunded", amount),
            &[&reservation.renter_id, &reservation.owner_id],
        );
        Ok(refunded)
    }

    async fn load_reservation(&self, reservation_id: Uuid) -> BookingResult<Reservation> {
        self.reservations
            .get(reservation_id)
            .await?
            .ok_or_else(|| BookingError::not_found("reservation", reservation_id))
    }

    async fn load_record(&self, reservation_id: Uuid) -> BookingResult<SettlementRecord> {
        self.settlements
            .get(reservation_id)
            .await?
            .ok_or_else(|| BookingError::not_found("settlement", reservation_id))
    }
}

fn authorize(actor: &Actor, reservation: &Reservation, allowed: &[Party], what: &str) -> BookingResult<()> {
    if actor.acts_as_any(allowed, &reservation.renter_id, &reservation.owner_id) {
        Ok(())
    } else {
        Err(BookingError::Authorization(format!(
            "{} may not {} reservation {}",
            actor.id, what, reservation.id
        )))
    }
}
