use std::sync::Arc;

use anyhow::anyhow;
use chrono::Duration;
use rentora_booking::{BookingEngine, BookingSettings, FeeSchedule, MockPaymentAdapter, Ports};
use rentora_core::notifier::Notifier;
use rentora_core::payment::PaymentAdapter;
use rentora_core::repository::{
    ExtensionRepository, IdempotencyStore, ItemCatalog, ReservationRepository, SettlementRepository,
};
use rentora_store::app_config::{BusinessRules, PaymentProvider, PaymentsConfig};
use rentora_store::RedisClient;

use crate::metrics::ApiMetrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    /// Required in `X-Webhook-Secret` on payment callbacks when set.
    pub webhook_secret: Option<String>,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BookingEngine>,
    /// Rate limiting is skipped when absent.
    pub redis: Option<Arc<RedisClient>>,
    pub metrics: Arc<ApiMetrics>,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
}

/// Engine settings derived from the `business_rules` config section.
pub fn booking_settings(rules: &BusinessRules) -> BookingSettings {
    BookingSettings {
        pricing: rules.pricing(),
        overlap_policy: rules.overlap_policy,
        stale_pending_ttl: Duration::minutes(rules.stale_pending_minutes),
        fees: FeeSchedule {
            processing_fee_percent: rules.processing_fee_percent,
            processing_fee_fixed: rules.processing_fee_fixed,
        },
        currency: rules.currency.clone(),
        idempotency_ttl_seconds: rules.idempotency_ttl_seconds,
    }
}

/// Wire one store implementing every repository port into the engine's ports.
pub fn ports<S>(
    store: Arc<S>,
    idempotency: Arc<dyn IdempotencyStore>,
    payments: Arc<dyn PaymentAdapter>,
    notifier: Arc<dyn Notifier>,
) -> Ports
where
    S: ItemCatalog + ReservationRepository + ExtensionRepository + SettlementRepository + 'static,
{
    Ports {
        catalog: store.clone(),
        reservations: store.clone(),
        extensions: store.clone(),
        settlements: store,
        idempotency,
        payments,
        notifier,
    }
}

/// The processor named by `payments.provider`. Refuses to guess when none is configured.
pub fn payment_adapter(config: &PaymentsConfig) -> anyhow::Result<Arc<dyn PaymentAdapter>> {
    match config.provider {
        Some(PaymentProvider::Mock) => {
            tracing::warn!(
                "payments.provider = \"mock\": intents read back as paid and refunds move no money"
            );
            if config.webhook_secret.is_none() {
                tracing::warn!("payments.webhook_secret is unset: payment webhooks are not authenticated");
            }
            Ok(Arc::new(MockPaymentAdapter::new()))
        }
        None => Err(anyhow!(
            "payments.provider is not configured (set it to \"mock\" for development)"
        )),
    }
}
