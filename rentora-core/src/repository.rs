use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentora_catalog::{ConflictDetector, ItemListing};
use uuid::Uuid;

use crate::reservation::{
    ExtensionRequest, ExtensionStatus, PaymentState, Reservation, ReservationStatus, SettlementRecord,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Conflicting active reservations: {0:?}")]
    Conflict(Vec<Uuid>),

    #[error("Record changed concurrently: {0}")]
    StaleWrite(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Storage backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What a conflict-sensitive write must re-verify inside its own transaction.
#[derive(Debug, Clone, Copy)]
pub struct AvailabilityGuard {
    pub capacity: u32,
    pub detector: ConflictDetector,
}

/// Read-only view of the listing catalog.
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    async fn get_item(&self, item_id: Uuid) -> StoreResult<Option<ItemListing>>;
}

/// Repository trait for reservation data access
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Insert a PENDING reservation after re-checking, atomically with the insert,
    /// that the item's active reservations leave room for it.
    /// Fails with `StoreError::Conflict` otherwise.
    async fn insert_if_available(
        &self,
        reservation: &Reservation,
        guard: AvailabilityGuard,
    ) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>>;

    /// CONFIRMED and IN_PROGRESS reservations of an item.
    async fn list_active_for_item(&self, item_id: Uuid) -> StoreResult<Vec<Reservation>>;

    /// Compare-and-set: persist `reservation` only if the stored status still equals `expected`.
    /// Returns `false` when the stored status moved on.
    async fn update_if_status(
        &self,
        reservation: &Reservation,
        expected: ReservationStatus,
    ) -> StoreResult<bool>;

    /// Compare-and-set like [`update_if_status`](Self::update_if_status) for the move into
    /// CONFIRMED: the item's active reservations are re-checked in the same unit, since
    /// overlapping PENDING reservations may coexist until one of them is confirmed.
    /// Fails with `StoreError::Conflict` when the dates are no longer free.
    async fn confirm_if_available(
        &self,
        reservation: &Reservation,
        expected: ReservationStatus,
        guard: AvailabilityGuard,
    ) -> StoreResult<bool>;

    /// Delete PENDING reservations created before `cutoff` that never had a payment captured.
    async fn purge_stale_pending(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Uuid>>;
}

/// Repository trait for extension request data access
#[async_trait]
pub trait ExtensionRepository: Send + Sync {
    /// Fails with `StoreError::Duplicate` when the reservation already has a PENDING request.
    async fn insert_pending(&self, extension: &ExtensionRequest) -> StoreResult<()>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<ExtensionRequest>>;

    async fn list_for_reservation(&self, reservation_id: Uuid) -> StoreResult<Vec<ExtensionRequest>>;

    /// Compare-and-set on the extension status.
    async fn update_if_status(
        &self,
        extension: &ExtensionRequest,
        expected: ExtensionStatus,
    ) -> StoreResult<bool>;

    /// Approve `extension` and persist the extended `parent` as one unit:
    /// the extension must still be PENDING, the parent must still have
    /// `expected_parent_end` and its current status, and the extended range
    /// must still be free. `StaleWrite` or `Conflict` otherwise.
    async fn apply_approval(
        &self,
        extension: &ExtensionRequest,
        parent: &Reservation,
        expected_parent_end: DateTime<Utc>,
        guard: AvailabilityGuard,
    ) -> StoreResult<()>;
}

/// Repository trait for settlement ledger access
#[async_trait]
pub trait SettlementRepository: Send + Sync {
    /// Fails with `StoreError::Duplicate` if the reservation already has a record.
    async fn insert(&self, record: &SettlementRecord) -> StoreResult<()>;

    async fn get(&self, reservation_id: Uuid) -> StoreResult<Option<SettlementRecord>>;

    /// Compare-and-set on payment state and the release flag.
    async fn update_if(
        &self,
        record: &SettlementRecord,
        expected_payment: PaymentState,
        expected_released: bool,
    ) -> StoreResult<bool>;
}

/// Remembers which reservation an idempotency key produced.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Claim `key` for `reservation_id`. Returns the reservation id already bound
    /// to the key when it was claimed before.
    async fn claim(&self, key: &str, reservation_id: Uuid, ttl_seconds: u64) -> StoreResult<Option<Uuid>>;

    /// Forget a claim whose create did not go through.
    async fn release(&self, key: &str) -> StoreResult<()>;
}
