use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rentora_catalog::{DeliveryPolicy, DepositPolicy, ItemListing};
use rentora_core::repository::{
    AvailabilityGuard, ExtensionRepository, ItemCatalog, ReservationRepository, SettlementRepository,
    StoreError, StoreResult,
};
use rentora_core::{
    ContactDetails, DeliveryDetails, ExtensionRequest, ExtensionStatus, PaymentState, Reservation,
    ReservationStatus, SettlementRecord,
};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::ensure_available;

/// Postgres implementation of every booking repository.
///
/// Writes that depend on availability run SERIALIZABLE and first take a
/// transaction-scoped advisory lock keyed on the item, so two bookings of the
/// same item queue up instead of both passing the check.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin_item_tx(&self, item_id: Uuid) -> StoreResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(backend)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(item_id.to_string())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        Ok(tx)
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            // unique_violation
            Some("23505") => return StoreError::Duplicate(db.message().to_string()),
            // serialization_failure
            Some("40001") => return StoreError::StaleWrite(db.message().to_string()),
            _ => {}
        }
    }
    StoreError::Backend(e.to_string())
}

fn corrupt(what: &str, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("corrupt {} row: {}", what, detail))
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: Uuid,
    owner_id: String,
    title: String,
    daily_rate: Decimal,
    capacity: i32,
    deposit_policy: Json<DepositPolicy>,
    delivery_available: bool,
    delivery_fee: Decimal,
    instant_book: bool,
    is_active: bool,
}

impl TryFrom<ItemRow> for ItemListing {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(ItemListing {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            daily_rate: row.daily_rate,
            capacity: u32::try_from(row.capacity).map_err(|e| corrupt("item", e))?,
            deposit_policy: row.deposit_policy.0,
            delivery: DeliveryPolicy {
                available: row.delivery_available,
                flat_fee: row.delivery_fee,
            },
            instant_book: row.instant_book,
            is_active: row.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    item_id: Uuid,
    renter_id: String,
    owner_id: String,
    quantity: i32,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    duration_days: i64,
    daily_rate: Decimal,
    deposit_policy: Json<DepositPolicy>,
    subtotal: Decimal,
    service_fee: Decimal,
    delivery_fee: Decimal,
    deposit_amount: Decimal,
    total_amount: Decimal,
    currency: String,
    status: String,
    delivery: Json<DeliveryDetails>,
    contact: Json<ContactDetails>,
    cancellation_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    confirmed_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = StoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Reservation {
            id: row.id,
            item_id: row.item_id,
            renter_id: row.renter_id,
            owner_id: row.owner_id,
            quantity: u32::try_from(row.quantity).map_err(|e| corrupt("reservation", e))?,
            start_date: row.start_date,
            end_date: row.end_date,
            duration_days: row.duration_days,
            daily_rate: row.daily_rate,
            deposit_policy: row.deposit_policy.0,
            subtotal: row.subtotal,
            service_fee: row.service_fee,
            delivery_fee: row.delivery_fee,
            deposit_amount: row.deposit_amount,
            total_amount: row.total_amount,
            currency: row.currency,
            status: row.status.parse().map_err(|e: String| corrupt("reservation", e))?,
            delivery: row.delivery.0,
            contact: row.contact.0,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
            confirmed_at: row.confirmed_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExtensionRow {
    id: Uuid,
    reservation_id: Uuid,
    requested_by: String,
    current_end_date: DateTime<Utc>,
    new_end_date: DateTime<Utc>,
    additional_days: i64,
    additional_price: Decimal,
    additional_total: Decimal,
    status: String,
    decision_reason: Option<String>,
    requested_at: DateTime<Utc>,
    decided_at: Option<DateTime<Utc>>,
}

impl TryFrom<ExtensionRow> for ExtensionRequest {
    type Error = StoreError;

    fn try_from(row: ExtensionRow) -> Result<Self, Self::Error> {
        Ok(ExtensionRequest {
            id: row.id,
            reservation_id: row.reservation_id,
            requested_by: row.requested_by,
            current_end_date: row.current_end_date,
            new_end_date: row.new_end_date,
            additional_days: row.additional_days,
            additional_price: row.additional_price,
            additional_total: row.additional_total,
            status: row.status.parse().map_err(|e: String| corrupt("extension", e))?,
            decision_reason: row.decision_reason,
            requested_at: row.requested_at,
            decided_at: row.decided_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SettlementRow {
    reservation_id: Uuid,
    payment_reference: String,
    currency: String,
    captured_amount: Decimal,
    platform_fee: Decimal,
    processing_fee: Decimal,
    deposit_amount: Decimal,
    deposit_hold: bool,
    deposit_released: bool,
    deposit_retained: Decimal,
    deposit_refundable: Decimal,
    retention_reason: Option<String>,
    payout_amount: Option<Decimal>,
    refund_amount: Decimal,
    refund_reason: Option<String>,
    payment_state: String,
    captured_at: DateTime<Utc>,
    released_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SettlementRow> for SettlementRecord {
    type Error = StoreError;

    fn try_from(row: SettlementRow) -> Result<Self, Self::Error> {
        Ok(SettlementRecord {
            reservation_id: row.reservation_id,
            payment_reference: row.payment_reference,
            currency: row.currency,
            captured_amount: row.captured_amount,
            platform_fee: row.platform_fee,
            processing_fee: row.processing_fee,
            deposit_amount: row.deposit_amount,
            deposit_hold: row.deposit_hold,
            deposit_released: row.deposit_released,
            deposit_retained: row.deposit_retained,
            deposit_refundable: row.deposit_refundable,
            retention_reason: row.retention_reason,
            payout_amount: row.payout_amount,
            refund_amount: row.refund_amount,
            refund_reason: row.refund_reason,
            payment_state: row.payment_state.parse().map_err(|e: String| corrupt("settlement", e))?,
            captured_at: row.captured_at,
            released_at: row.released_at,
            refunded_at: row.refunded_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_RESERVATION: &str = r#"
    SELECT id, item_id, renter_id, owner_id, quantity, start_date, end_date, duration_days,
           daily_rate, deposit_policy, subtotal, service_fee, delivery_fee, deposit_amount,
           total_amount, currency, status, delivery, contact, cancellation_reason,
           created_at, updated_at, confirmed_at, started_at, completed_at, cancelled_at
    FROM reservations
"#;

const SELECT_EXTENSION: &str = r#"
    SELECT id, reservation_id, requested_by, current_end_date, new_end_date, additional_days,
           additional_price, additional_total, status, decision_reason, requested_at, decided_at
    FROM extension_requests
"#;

async fn active_for_item(
    tx: &mut Transaction<'static, Postgres>,
    item_id: Uuid,
) -> StoreResult<Vec<Reservation>> {
    let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
        "{} WHERE item_id = $1 AND status IN ('CONFIRMED', 'IN_PROGRESS') FOR UPDATE",
        SELECT_RESERVATION
    ))
    .bind(item_id)
    .fetch_all(&mut **tx)
    .await
    .map_err(backend)?;

    rows.into_iter().map(Reservation::try_from).collect()
}

/// Full-row overwrite of a reservation guarded by its previous status.
async fn write_reservation<'e, E>(
    executor: E,
    r: &Reservation,
    expected: ReservationStatus,
    expected_end: DateTime<Utc>,
) -> StoreResult<bool>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query(
        r#"
        UPDATE reservations SET
            end_date = $3, duration_days = $4, subtotal = $5, service_fee = $6,
            delivery_fee = $7, deposit_amount = $8, total_amount = $9, status = $10,
            cancellation_reason = $11, updated_at = $12, confirmed_at = $13,
            started_at = $14, completed_at = $15, cancelled_at = $16
        WHERE id = $1 AND status = $2 AND end_date = $17
        "#,
    )
    .bind(r.id)
    .bind(expected.as_str())
    .bind(r.end_date)
    .bind(r.duration_days)
    .bind(r.subtotal)
    .bind(r.service_fee)
    .bind(r.delivery_fee)
    .bind(r.deposit_amount)
    .bind(r.total_amount)
    .bind(r.status.as_str())
    .bind(&r.cancellation_reason)
    .bind(r.updated_at)
    .bind(r.confirmed_at)
    .bind(r.started_at)
    .bind(r.completed_at)
    .bind(r.cancelled_at)
    .bind(expected_end)
    .execute(executor)
    .await
    .map_err(backend)?;

    Ok(result.rows_affected() == 1)
}

#[async_trait]
impl ItemCatalog for PgStore {
    async fn get_item(&self, item_id: Uuid) -> StoreResult<Option<ItemListing>> {
        let row: Option<ItemRow> = sqlx::query_as(
            r#"
            SELECT id, owner_id, title, daily_rate, capacity, deposit_policy,
                   delivery_available, delivery_fee, instant_book, is_active
            FROM items WHERE id = $1
            "#,
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(ItemListing::try_from).transpose()
    }
}

#[async_trait]
impl ReservationRepository for PgStore {
    async fn insert_if_available(
        &self,
        r: &Reservation,
        guard: AvailabilityGuard,
    ) -> StoreResult<()> {
        let mut tx = self.begin_item_tx(r.item_id).await?;

        let active = active_for_item(&mut tx, r.item_id).await?;
        ensure_available(&guard, &r.range(), r.quantity, &active, None)?;

        let quantity = i32::try_from(r.quantity).map_err(|e| StoreError::Backend(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO reservations (
                id, item_id, renter_id, owner_id, quantity, start_date, end_date, duration_days,
                daily_rate, deposit_policy, subtotal, service_fee, delivery_fee, deposit_amount,
                total_amount, currency, status, delivery, contact, cancellation_reason,
                created_at, updated_at, confirmed_at, started_at, completed_at, cancelled_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26)
            "#,
        )
        .bind(r.id)
        .bind(r.item_id)
        .bind(&r.renter_id)
        .bind(&r.owner_id)
        .bind(quantity)
        .bind(r.start_date)
        .bind(r.end_date)
        .bind(r.duration_days)
        .bind(r.daily_rate)
        .bind(Json(r.deposit_policy))
        .bind(r.subtotal)
        .bind(r.service_fee)
        .bind(r.delivery_fee)
        .bind(r.deposit_amount)
        .bind(r.total_amount)
        .bind(&r.currency)
        .bind(r.status.as_str())
        .bind(Json(&r.delivery))
        .bind(Json(&r.contact))
        .bind(&r.cancellation_reason)
        .bind(r.created_at)
        .bind(r.updated_at)
        .bind(r.confirmed_at)
        .bind(r.started_at)
        .bind(r.completed_at)
        .bind(r.cancelled_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Reservation>> {
        let row: Option<ReservationRow> =
            sqlx::query_as(&format!("{} WHERE id = $1", SELECT_RESERVATION))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        row.map(Reservation::try_from).transpose()
    }

    async fn list_active_for_item(&self, item_id: Uuid) -> StoreResult<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(&format!(
            "{} WHERE item_id = $1 AND status IN ('CONFIRMED', 'IN_PROGRESS') ORDER BY start_date",
            SELECT_RESERVATION
        ))
        .bind(item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(Reservation::try_from).collect()
    }

    async fn update_if_status(
        &self,
        r: &Reservation,
        expected: ReservationStatus,
    ) -> StoreResult<bool> {
        // Status moves never change the end date.
        write_reservation(&self.pool, r, expected, r.end_date).await
    }

    async fn confirm_if_available(
        &self,
        r: &Reservation,
        expected: ReservationStatus,
        guard: AvailabilityGuard,
    ) -> StoreResult<bool> {
        let mut tx = self.begin_item_tx(r.item_id).await?;

        let active = active_for_item(&mut tx, r.item_id).await?;
        ensure_available(&guard, &r.range(), r.quantity, &active, Some(r.id))?;

        let written = write_reservation(&mut *tx, r, expected, r.end_date).await?;
        if written {
            tx.commit().await.map_err(backend)?;
        }
        Ok(written)
    }

    async fn purge_stale_pending(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            DELETE FROM reservations r
            WHERE r.status = 'PENDING'
              AND r.created_at < $1
              AND NOT EXISTS (SELECT 1 FROM settlements s WHERE s.reservation_id = r.id)
            RETURNING r.id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(ids)
    }
}

#[async_trait]
impl ExtensionRepository for PgStore {
    async fn insert_pending(&self, e: &ExtensionRequest) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO extension_requests (
                id, reservation_id, requested_by, current_end_date, new_end_date, additional_days,
                additional_price, additional_total, status, decision_reason, requested_at, decided_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(e.id)
        .bind(e.reservation_id)
        .bind(&e.requested_by)
        .bind(e.current_end_date)
        .bind(e.new_end_date)
        .bind(e.additional_days)
        .bind(e.additional_price)
        .bind(e.additional_total)
        .bind(e.status.as_str())
        .bind(&e.decision_reason)
        .bind(e.requested_at)
        .bind(e.decided_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<ExtensionRequest>> {
        let row: Option<ExtensionRow> = sqlx::query_as(&format!("{} WHERE id = $1", SELECT_EXTENSION))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        row.map(ExtensionRequest::try_from).transpose()
    }

    async fn list_for_reservation(&self, reservation_id: Uuid) -> StoreResult<Vec<ExtensionRequest>> {
        let rows: Vec<ExtensionRow> = sqlx::query_as(&format!(
            "{} WHERE reservation_id = $1 ORDER BY requested_at",
            SELECT_EXTENSION
        ))
        .bind(reservation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(ExtensionRequest::try_from).collect()
    }

    async fn update_if_status(
        &self,
        e: &ExtensionRequest,
        expected: ExtensionStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE extension_requests
            SET status = $3, decision_reason = $4, decided_at = $5
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(e.id)
        .bind(expected.as_str())
        .bind(e.status.as_str())
        .bind(&e.decision_reason)
        .bind(e.decided_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_approval(
        &self,
        e: &ExtensionRequest,
        parent: &Reservation,
        expected_parent_end: DateTime<Utc>,
        guard: AvailabilityGuard,
    ) -> StoreResult<()> {
        let mut tx = self.begin_item_tx(parent.item_id).await?;

        let active = active_for_item(&mut tx, parent.item_id).await?;
        ensure_available(&guard, &parent.range(), parent.quantity, &active, Some(parent.id))?;

        let decided = sqlx::query(
            r#"
            UPDATE extension_requests
            SET status = $2, decision_reason = $3, decided_at = $4
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(e.id)
        .bind(e.status.as_str())
        .bind(&e.decision_reason)
        .bind(e.decided_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;
        if decided.rows_affected() != 1 {
            return Err(StoreError::StaleWrite(format!("extension {}", e.id)));
        }

        if !write_reservation(&mut *tx, parent, parent.status, expected_parent_end).await? {
            return Err(StoreError::StaleWrite(format!("reservation {}", parent.id)));
        }

        tx.commit().await.map_err(backend)
    }
}

#[async_trait]
impl SettlementRepository for PgStore {
    async fn insert(&self, s: &SettlementRecord) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO settlements (
                reservation_id, payment_reference, currency, captured_amount, platform_fee,
                processing_fee, deposit_amount, deposit_hold, deposit_released, deposit_retained,
                deposit_refundable, retention_reason, payout_amount, refund_amount, refund_reason,
                payment_state, captured_at, released_at, refunded_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20)
            "#,
        )
        .bind(s.reservation_id)
        .bind(&s.payment_reference)
        .bind(&s.currency)
        .bind(s.captured_amount)
        .bind(s.platform_fee)
        .bind(s.processing_fee)
        .bind(s.deposit_amount)
        .bind(s.deposit_hold)
        .bind(s.deposit_released)
        .bind(s.deposit_retained)
        .bind(s.deposit_refundable)
        .bind(&s.retention_reason)
        .bind(s.payout_amount)
        .bind(s.refund_amount)
        .bind(&s.refund_reason)
        .bind(s.payment_state.as_str())
        .bind(s.captured_at)
        .bind(s.released_at)
        .bind(s.refunded_at)
        .bind(s.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn get(&self, reservation_id: Uuid) -> StoreResult<Option<SettlementRecord>> {
        let row: Option<SettlementRow> = sqlx::query_as(
            r#"
            SELECT reservation_id, payment_reference, currency, captured_amount, platform_fee,
                   processing_fee, deposit_amount, deposit_hold, deposit_released, deposit_retained,
                   deposit_refundable, retention_reason, payout_amount, refund_amount, refund_reason,
                   payment_state, captured_at, released_at, refunded_at, updated_at
            FROM settlements WHERE reservation_id = $1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(SettlementRecord::try_from).transpose()
    }

    async fn update_if(
        &self,
        s: &SettlementRecord,
        expected_payment: PaymentState,
        expected_released: bool,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE settlements SET
                deposit_hold = $4, deposit_released = $5, deposit_retained = $6,
                deposit_refundable = $7, retention_reason = $8, payout_amount = $9,
                refund_amount = $10, refund_reason = $11, payment_state = $12,
                released_at = $13, refunded_at = $14, updated_at = $15
            WHERE reservation_id = $1 AND payment_state = $2 AND deposit_released = $3
            "#,
        )
        .bind(s.reservation_id)
        .bind(expected_payment.as_str())
        .bind(expected_released)
        .bind(s.deposit_hold)
        .bind(s.deposit_released)
        .bind(s.deposit_retained)
        .bind(s.deposit_refundable)
        .bind(&s.retention_reason)
        .bind(s.payout_amount)
        .bind(s.refund_amount)
        .bind(&s.refund_reason)
        .bind(s.payment_state.as_str())
        .bind(s.released_at)
        .bind(s.refunded_at)
        .bind(s.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(result.rows_affected() == 1)
    }
}
