//! Wiring shared by the unit tests of this crate.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rentora_catalog::ItemListing;
use rentora_core::notifier::{LogNotifier, NotifyError, Notifier};
use rentora_core::repository::ReservationRepository;
use rentora_core::{Actor, ContactDetails, Reservation, ReservationStatus};
use rentora_shared::{Masked, RentalEvent};
use rentora_store::MemoryStore;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::manager::CreateReservation;
use crate::orchestrator::MockPaymentAdapter;
use crate::{BookingEngine, BookingSettings, Ports};

pub(crate) use rentora_core::payment::PaymentAdapter;
use rentora_core::payment::{PaymentError, PaymentIntent, RefundReceipt};

pub(crate) const OWNER: &str = "owner-1";
pub(crate) const RENTER: &str = "renter-1";

pub(crate) struct Harness {
    pub engine: BookingEngine,
    pub store: Arc<MemoryStore>,
    pub payments: Arc<MockPaymentAdapter>,
}

pub(crate) struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn send(&self, _event: &RentalEvent, _recipient: &str) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("broker down".to_string()))
    }
}

/// Never finishes delivering.
pub(crate) struct HangingNotifier;

#[async_trait]
impl Notifier for HangingNotifier {
    async fn send(&self, _event: &RentalEvent, _recipient: &str) -> Result<(), NotifyError> {
        std::future::pending().await
    }
}

/// Mock processor whose refunds stay in flight for a moment, and can be made to fail.
pub(crate) struct SlowRefunds {
    inner: Arc<MockPaymentAdapter>,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl SlowRefunds {
    pub fn new(inner: Arc<MockPaymentAdapter>) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    pub fn fail_refunds(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn refund_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentAdapter for SlowRefunds {
    async fn create_intent(
        &self,
        reservation_id: Uuid,
        amount: Decimal,
        currency: &str,
    ) -> Result<PaymentIntent, PaymentError> {
        self.inner.create_intent(reservation_id, amount, currency).await
    }

    async fn get_intent(&self, intent_id: &str) -> Result<PaymentIntent, PaymentError> {
        self.inner.get_intent(intent_id).await
    }

    async fn refund(&self, intent_id: &str, amount: Decimal) -> Result<RefundReceipt, PaymentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable("processor timeout".to_string()));
        }
        self.inner.refund(intent_id, amount).await
    }
}

pub(crate) fn harness(items: Vec<ItemListing>) -> Harness {
    harness_with_notifier(items, Arc::new(LogNotifier))
}

pub(crate) fn harness_with_notifier(items: Vec<ItemListing>, notifier: Arc<dyn Notifier>) -> Harness {
    let payments = Arc::new(MockPaymentAdapter::new());
    build(items, notifier, payments.clone(), payments)
}

/// Engine talks to `adapter`; `payments` is the mock it ultimately delegates to.
pub(crate) fn harness_with_payments(
    items: Vec<ItemListing>,
    payments: Arc<MockPaymentAdapter>,
    adapter: Arc<dyn PaymentAdapter>,
) -> Harness {
    build(items, Arc::new(LogNotifier), payments, adapter)
}

fn build(
    items: Vec<ItemListing>,
    notifier: Arc<dyn Notifier>,
    payments: Arc<MockPaymentAdapter>,
    adapter: Arc<dyn PaymentAdapter>,
) -> Harness {
    let store = Arc::new(MemoryStore::with_items(items));
    let ports = Ports {
        catalog: store.clone(),
        reservations: store.clone(),
        extensions: store.clone(),
        settlements: store.clone(),
        idempotency: store.clone(),
        payments: adapter,
        notifier,
    };
    Harness {
        engine: BookingEngine::new(ports, BookingSettings::default()),
        store,
        payments,
    }
}

pub(crate) fn renter() -> Actor {
    Actor::member(RENTER)
}

pub(crate) fn owner() -> Actor {
    Actor::member(OWNER)
}

/// Midnight UTC today, shifted by `n` days.
pub(crate) fn day(n: i64) -> DateTime<Utc> {
    Utc::now().date_naive().and_hms_opt(0, 0, 0).unwrap().and_utc() + Duration::days(n)
}

pub(crate) fn request(item: &ItemListing, start: DateTime<Utc>, end: DateTime<Utc>) -> CreateReservation {
    CreateReservation {
        item_id: item.id,
        start_date: start,
        end_date: end,
        quantity: 1,
        delivery_option: Default::default(),
        delivery_address: None,
        contact: ContactDetails {
            full_name: "Riley Renter".to_string(),
            phone: Masked::new("+1 555 0101".to_string()),
            email: Masked::new("riley@example.com".to_string()),
        },
        idempotency_key: None,
    }
}

pub(crate) async fn confirmed(
    h: &Harness,
    item: &ItemListing,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Reservation {
    let created = h
        .engine
        .reservations
        .create(&renter(), request(item, start, end))
        .await
        .unwrap();
    h.engine
        .reservations
        .confirm(&owner(), created.reservation.id)
        .await
        .unwrap()
}

/// Created, paid through the mock processor and confirmed. Returns the intent id too.
pub(crate) async fn paid_and_confirmed(
    h: &Harness,
    item: &ItemListing,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> (Reservation, String) {
    let created = h
        .engine
        .reservations
        .create(&renter(), request(item, start, end))
        .await
        .unwrap();
    let intent = h.payments.get_intent(&created.payment.intent_id).await.unwrap();
    h.engine.reservations.on_payment_captured(&intent).await.unwrap();

    let current = h
        .engine
        .reservations
        .get(&owner(), created.reservation.id)
        .await
        .unwrap();
    let reservation = if current.status == ReservationStatus::Pending {
        h.engine.reservations.confirm(&owner(), current.id).await.unwrap()
    } else {
        current
    };
    (reservation, intent.id)
}

/// Paid, started and returned. `start` must not be in the future.
pub(crate) async fn completed_with_capture(
    h: &Harness,
    item: &ItemListing,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Reservation {
    let (r, _) = paid_and_confirmed(h, item, start, end).await;
    h.engine.reservations.start(&owner(), r.id).await.unwrap();
    h.engine.reservations.complete(&owner(), r.id).await.unwrap()
}

/// Pretend the reservation was created `by` earlier.
pub(crate) async fn backdate(h: &Harness, id: Uuid, by: Duration) {
    let mut r = ReservationRepository::get(h.store.as_ref(), id).await.unwrap().unwrap();
    r.created_at -= by;
    let status = r.status;
    assert!(ReservationRepository::update_if_status(h.store.as_ref(), &r, status)
        .await
        .unwrap());
}
