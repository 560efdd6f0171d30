pub mod error;
pub mod extension;
pub mod manager;
pub mod notify;
pub mod orchestrator;
pub mod reaper;
pub mod settlement;

pub use error::{BookingError, BookingResult};
pub use extension::{ExtensionDecision, ExtensionWorkflow};
pub use manager::{CaptureOutcome, CreateReservation, CreatedReservation, LifecycleAction, ReservationManager};
pub use orchestrator::{MockPaymentAdapter, PaymentDescriptor, PaymentOrchestrator};
pub use reaper::StaleReservationReaper;
pub use settlement::{DepositAction, FeeSchedule, SettleDeposit, SettlementLedger};

use chrono::Duration;
use rentora_catalog::{ConflictDetector, OverlapPolicy, PricingConfig, PricingEngine};
use rentora_core::notifier::Notifier;
use rentora_core::payment::PaymentAdapter;
use rentora_core::repository::{
    ExtensionRepository, IdempotencyStore, ItemCatalog, ReservationRepository, SettlementRepository,
};
use std::sync::Arc;

use crate::notify::Notifications;

/// Collaborators the engine is wired with.
#[derive(Clone)]
pub struct Ports {
    pub catalog: Arc<dyn ItemCatalog>,
    pub reservations: Arc<dyn ReservationRepository>,
    pub extensions: Arc<dyn ExtensionRepository>,
    pub settlements: Arc<dyn SettlementRepository>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub payments: Arc<dyn PaymentAdapter>,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub pricing: PricingConfig,
    pub overlap_policy: OverlapPolicy,
    /// Unpaid PENDING reservations older than this are reaped
    pub stale_pending_ttl: Duration,
    pub fees: FeeSchedule,
    pub currency: String,
    pub idempotency_ttl_seconds: u64,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            pricing: PricingConfig::default(),
            overlap_policy: OverlapPolicy::default(),
            stale_pending_ttl: Duration::minutes(30),
            fees: FeeSchedule::default(),
            currency: "USD".to_string(),
            idempotency_ttl_seconds: 86_400,
        }
    }
}

/// Everything the transport layer drives, wired once at startup.
pub struct BookingEngine {
    pub reservations: ReservationManager,
    pub extensions: ExtensionWorkflow,
    pub ledger: Arc<SettlementLedger>,
    pub reaper: StaleReservationReaper,
}

impl BookingEngine {
    pub fn new(ports: Ports, settings: BookingSettings) -> Self {
        let notifications = Notifications::new(ports.notifier.clone());
        let payments = Arc::new(PaymentOrchestrator::new(ports.payments.clone()));
        let detector = ConflictDetector::new(settings.overlap_policy);
        let pricing = Arc::new(PricingEngine::new(settings.pricing.clone()));

        let reaper = StaleReservationReaper::new(ports.reservations.clone(), settings.stale_pending_ttl);
        let ledger = Arc::new(SettlementLedger::new(
            ports.reservations.clone(),
            ports.settlements.clone(),
            payments.clone(),
            notifications.clone(),
            settings.fees,
        ));
        let reservations = ReservationManager::new(
            &ports,
            reaper.clone(),
            ledger.clone(),
            payments,
            notifications.clone(),
            pricing.clone(),
            detector,
            settings.currency.clone(),
            settings.idempotency_ttl_seconds,
        );
        let extensions = ExtensionWorkflow::new(&ports, notifications, pricing, detector);

        Self {
            reservations,
            extensions,
            ledger,
            reaper,
        }
    }
}

#[cfg(test)]
mod test_support;
