use chrono::{DateTime, Utc};
use rentora_catalog::{duration_days, Availability, ConflictDetector, DateRange, ItemListing, PriceQuote, PricingEngine};
use rentora_core::repository::{ExtensionRepository, ItemCatalog, ReservationRepository};
use rentora_core::{Actor, ExtensionRequest, ExtensionStatus, Party, Reservation, ReservationStatus, StoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{BookingError, BookingResult};
use crate::manager::guard;
use crate::notify::{self, Notifications};
use crate::Ports;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionDecision {
    Accept,
    Decline,
}

/// Requests to move a CONFIRMED or IN_PROGRESS reservation's end date later.
///
/// Prices are always recomputed from `[start, new_end)`. The deposit already
/// held is kept as is.
pub struct ExtensionWorkflow {
    catalog: Arc<dyn ItemCatalog>,
    reservations: Arc<dyn ReservationRepository>,
    extensions: Arc<dyn ExtensionRepository>,
    notifications: Notifications,
    pricing: Arc<PricingEngine>,
    detector: ConflictDetector,
}

impl ExtensionWorkflow {
    pub fn new(
        ports: &Ports,
        notifications: Notifications,
        pricing: Arc<PricingEngine>,
        detector: ConflictDetector,
    ) -> Self {
        Self {
            catalog: ports.catalog.clone(),
            reservations: ports.reservations.clone(),
            extensions: ports.extensions.clone(),
            notifications,
            pricing,
            detector,
        }
    }

    pub async fn request(
        &self,
        actor: &Actor,
        reservation_id: Uuid,
        new_end_date: DateTime<Utc>,
    ) -> BookingResult<ExtensionRequest> {
        let parent = self.load_parent(reservation_id).await?;
        if actor.id != parent.renter_id {
            return Err(BookingError::Authorization(format!(
                "only the renter may extend reservation {}",
                parent.id
            )));
        }
        Self::ensure_extendable(&parent)?;
        if new_end_date <= parent.end_date {
            return Err(BookingError::Validation(format!(
                "new end date {} must be after the current end date {}",
                new_end_date, parent.end_date
            )));
        }

        let item = self.load_item(parent.item_id).await?;
        self.precheck(&parent, &item, new_end_date).await?;
        let quote = self.requote(&parent, new_end_date)?;

        let extension = ExtensionRequest {
            id: Uuid::new_v4(),
            reservation_id: parent.id,
            requested_by: actor.id.clone(),
            current_end_date: parent.end_date,
            new_end_date,
            additional_days: quote.duration_days - parent.duration_days,
            additional_price: quote.subtotal - parent.subtotal,
            additional_total: quote.total - parent.total_amount,
            status: ExtensionStatus::Pending,
            decision_reason: None,
            requested_at: Utc::now(),
            decided_at: None,
        };

        self.extensions.insert_pending(&extension).await.map_err(|e| match e {
            StoreError::Duplicate(_) => BookingError::State(format!(
                "reservation {} already has a pending extension",
                parent.id
            )),
            other => other.into(),
        })?;

        info!(
            "Extension {} requested for reservation {}: +{} days, +{}",
            extension.id, parent.id, extension.additional_days, extension.additional_price
        );
        self.notifications.send(notify::extension_requested(&extension), &[&parent.owner_id]);

        Ok(extension)
    }

    /// Accepting re-validates availability and re-prices against the parent
    /// as it is now, not as it was when the request was made.
    pub async fn decide(
        &self,
        actor: &Actor,
        extension_id: Uuid,
        decision: ExtensionDecision,
        reason: Option<String>,
    ) -> BookingResult<(Reservation, ExtensionRequest)> {
        let mut extension = self
            .extensions
            .get(extension_id)
            .await?
            .ok_or_else(|| BookingError::not_found("extension", extension_id))?;
        let parent = self.load_parent(extension.reservation_id).await?;

        if !actor.acts_as_any(&[Party::Owner, Party::Admin], &parent.renter_id, &parent.owner_id) {
            return Err(BookingError::Authorization(format!(
                "{} may not decide extensions of reservation {}",
                actor.id, parent.id
            )));
        }
        if extension.status != ExtensionStatus::Pending {
            return Err(BookingError::State(format!(
                "extension {} is already {}",
                extension.id,
                extension.status.as_str()
            )));
        }

        let now = Utc::now();
        extension.decision_reason = reason;
        extension.decided_at = Some(now);

        match decision {
            ExtensionDecision::Decline => {
                extension.status = ExtensionStatus::Rejected;
                if !self
                    .extensions
                    .update_if_status(&extension, ExtensionStatus::Pending)
                    .await?
                {
                    return Err(BookingError::State(format!(
                        "extension {} was decided concurrently",
                        extension.id
                    )));
                }
                info!("Extension {} declined by {}", extension.id, actor.id);
                self.notifications
                    .send(notify::extension_decided(&extension, false), &[&parent.renter_id]);
                Ok((parent, extension))
            }
            ExtensionDecision::Accept => {
                Self::ensure_extendable(&parent)?;
                if extension.new_end_date <= parent.end_date {
                    return Err(BookingError::State(format!(
                        "reservation {} already ends on or after {}",
                        parent.id, extension.new_end_date
                    )));
                }

                let item = self.load_item(parent.item_id).await?;
                self.precheck(&parent, &item, extension.new_end_date).await?;
                let quote = self.requote(&parent, extension.new_end_date)?;

                extension.status = ExtensionStatus::Approved;
                extension.additional_days = quote.duration_days - parent.duration_days;
                extension.additional_price = quote.subtotal - parent.subtotal;
                extension.additional_total = quote.total - parent.total_amount;

                let previous_end = parent.end_date;
                let mut extended = parent;
                extended.apply_extension(extension.new_end_date, &quote, now);

                self.extensions
                    .apply_approval(&extension, &extended, previous_end, guard(&item, self.detector))
                    .await
                    .inspect_err(|e| warn!("Approval of extension {} failed: {}", extension.id, e))?;

                info!(
                    "Extension {} approved by {}: reservation {} now ends {}, total {}",
                    extension.id, actor.id, extended.id, extended.end_date, extended.total_amount
                );
                self.notifications
                    .send(notify::extension_decided(&extension, true), &[&extended.renter_id]);
                Ok((extended, extension))
            }
        }
    }

    pub async fn list(&self, actor: &Actor, reservation_id: Uuid) -> BookingResult<Vec<ExtensionRequest>> {
        let parent = self.load_parent(reservation_id).await?;
        if actor.parties(&parent.renter_id, &parent.owner_id).is_empty() {
            return Err(BookingError::Authorization(format!(
                "{} is not a party to reservation {}",
                actor.id, reservation_id
            )));
        }
        Ok(self.extensions.list_for_reservation(reservation_id).await?)
    }

    fn ensure_extendable(parent: &Reservation) -> BookingResult<()> {
        match parent.status {
            ReservationStatus::Confirmed | ReservationStatus::InProgress => Ok(()),
            other => Err(BookingError::State(format!(
                "a {} reservation cannot be extended",
                other
            ))),
        }
    }

    /// Only the added days `[old_end, new_end)` are checked; the parent itself never counts.
    async fn precheck(
        &self,
        parent: &Reservation,
        item: &ItemListing,
        new_end_date: DateTime<Utc>,
    ) -> BookingResult<()> {
        let delta = DateRange::new(parent.end_date, new_end_date)?;
        let others: Vec<_> = self
            .reservations
            .list_active_for_item(parent.item_id)
            .await?
            .iter()
            .filter(|r| r.id != parent.id)
            .map(Reservation::as_active_booking)
            .collect();

        match self.detector.check(&delta, parent.quantity, item.capacity, &others) {
            Availability::Available => Ok(()),
            Availability::Conflict { reservation_ids } => {
                warn!(
                    "Extension of {} to {} conflicts with {:?}",
                    parent.id, new_end_date, reservation_ids
                );
                Err(BookingError::Conflict { ids: reservation_ids })
            }
        }
    }

    fn requote(&self, parent: &Reservation, new_end_date: DateTime<Utc>) -> BookingResult<PriceQuote> {
        let input = parent.pricing_input(duration_days(parent.start_date, new_end_date), parent.delivery_fee);
        Ok(self
            .pricing
            .requote_with_held_deposit(&input, parent.deposit_amount)?)
    }

    async fn load_parent(&self, reservation_id: Uuid) -> BookingResult<Reservation> {
        self.reservations
            .get(reservation_id)
            .await?
            .ok_or_else(|| BookingError::not_found("reservation", reservation_id))
    }

    async fn load_item(&self, item_id: Uuid) -> BookingResult<ItemListing> {
        self.catalog
            .get_item(item_id)
            .await?
            .ok_or_else(|| BookingError::not_found("item", item_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_extension_recomputes_full_price() {
        let item = ItemListing::new(OWNER, "Trailer", dec!(200));
        let h = harness(vec![item.clone()]);
        let parent = confirmed(&h, &item, day(10), day(15)).await;
        assert_eq!(parent.total_amount, dec!(1050));

        let ext = h.engine.extensions.request(&renter(), parent.id, day(20)).await.unwrap();
        assert_eq!(ext.additional_days, 5);
        assert_eq!(ext.additional_price, dec!(1000));
        assert_eq!(ext.additional_total, dec!(1050));
        assert_eq!(ext.status, ExtensionStatus::Pending);

        let (extended, ext) = h
            .engine
            .extensions
            .decide(&owner(), ext.id, ExtensionDecision::Accept, None)
            .await
            .unwrap();
        assert_eq!(ext.status, ExtensionStatus::Approved);
        assert_eq!(extended.end_date, day(20));
        assert_eq!(extended.duration_days, 10);
        assert_eq!(extended.subtotal, dec!(2000));
        assert_eq!(extended.service_fee, dec!(100));
        assert_eq!(extended.total_amount, parent.total_amount + dec!(1050));

        let stored = h.engine.reservations.get(&renter(), parent.id).await.unwrap();
        assert_eq!(stored.end_date, day(20));
    }

    #[tokio::test]
    async fn test_extension_keeps_held_deposit() {
        let item = ItemListing::new(OWNER, "Trailer", dec!(100))
            .with_deposit(rentora_catalog::DepositPolicy::Percentage(dec!(50)));
        let h = harness(vec![item.clone()]);
        let parent = confirmed(&h, &item, day(1), day(3)).await;
        assert_eq!(parent.deposit_amount, dec!(100));

        let ext = h.engine.extensions.request(&renter(), parent.id, day(5)).await.unwrap();
        let (extended, _) = h
            .engine
            .extensions
            .decide(&owner(), ext.id, ExtensionDecision::Accept, None)
            .await
            .unwrap();
        assert_eq!(extended.deposit_amount, dec!(100));
        assert_eq!(extended.subtotal, dec!(400));
    }

    #[tokio::test]
    async fn test_request_validation() {
        let item = ItemListing::new(OWNER, "Trailer", dec!(200));
        let h = harness(vec![item.clone()]);
        let parent = confirmed(&h, &item, day(10), day(15)).await;
        let workflow = &h.engine.extensions;

        for end in [day(15), day(12)] {
            assert!(matches!(
                workflow.request(&renter(), parent.id, end).await,
                Err(BookingError::Validation(_))
            ));
        }
        assert!(matches!(
            workflow.request(&owner(), parent.id, day(20)).await,
            Err(BookingError::Authorization(_))
        ));

        workflow.request(&renter(), parent.id, day(17)).await.unwrap();
        assert!(matches!(
            workflow.request(&renter(), parent.id, day(18)).await,
            Err(BookingError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_request_on_pending_parent_rejected() {
        let item = ItemListing::new(OWNER, "Trailer", dec!(200));
        let h = harness(vec![item.clone()]);
        let pending = h
            .engine
            .reservations
            .create(&renter(), request(&item, day(1), day(2)))
            .await
            .unwrap()
            .reservation;

        assert!(matches!(
            h.engine.extensions.request(&renter(), pending.id, day(4)).await,
            Err(BookingError::State(_))
        ));
    }

    #[tokio::test]
    async fn test_request_overlapping_active_conflicts() {
        let item = ItemListing::new(OWNER, "Trailer", dec!(200));
        let h = harness(vec![item.clone()]);
        let parent = confirmed(&h, &item, day(10), day(15)).await;
        let next = confirmed(&h, &item, day(18), day(22)).await;

        match h.engine.extensions.request(&renter(), parent.id, day(19)).await {
            Err(BookingError::Conflict { ids }) => assert_eq!(ids, vec![next.id]),
            other => panic!("expected conflict, got {:?}", other.map(|e| e.id)),
        }
    }

    #[tokio::test]
    async fn test_approval_rechecks_availability() {
        let item = ItemListing::new(OWNER, "Trailer", dec!(200));
        let h = harness(vec![item.clone()]);
        let parent = confirmed(&h, &item, day(10), day(15)).await;

        let ext = h.engine.extensions.request(&renter(), parent.id, day(20)).await.unwrap();
        // Someone else books the extra days before the owner decides.
        confirmed(&h, &item, day(17), day(19)).await;

        assert!(matches!(
            h.engine
                .extensions
                .decide(&owner(), ext.id, ExtensionDecision::Accept, None)
                .await,
            Err(BookingError::Conflict { .. })
        ));
        let listed = h.engine.extensions.list(&renter(), parent.id).await.unwrap();
        assert_eq!(listed[0].status, ExtensionStatus::Pending);
        let stored = h.engine.reservations.get(&renter(), parent.id).await.unwrap();
        assert_eq!(stored.end_date, day(15));
    }

    #[tokio::test]
    async fn test_decline_leaves_parent_untouched() {
        let item = ItemListing::new(OWNER, "Trailer", dec!(200));
        let h = harness(vec![item.clone()]);
        let parent = confirmed(&h, &item, day(10), day(15)).await;
        let ext = h.engine.extensions.request(&renter(), parent.id, day(20)).await.unwrap();

        assert!(matches!(
            h.engine
                .extensions
                .decide(&renter(), ext.id, ExtensionDecision::Accept, None)
                .await,
            Err(BookingError::Authorization(_))
        ));

        let (unchanged, declined) = h
            .engine
            .extensions
            .decide(&owner(), ext.id, ExtensionDecision::Decline, Some("needed back".into()))
            .await
            .unwrap();
        assert_eq!(declined.status, ExtensionStatus::Rejected);
        assert_eq!(declined.decision_reason.as_deref(), Some("needed back"));
        assert_eq!(unchanged.end_date, parent.end_date);
        assert_eq!(unchanged.total_amount, parent.total_amount);

        assert!(matches!(
            h.engine
                .extensions
                .decide(&owner(), ext.id, ExtensionDecision::Accept, None)
                .await,
            Err(BookingError::State(_))
        ));

        // A new request is allowed once the previous one is decided
        h.engine.extensions.request(&renter(), parent.id, day(16)).await.unwrap();
    }
}
