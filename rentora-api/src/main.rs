use std::net::SocketAddr;
use std::sync::Arc;

use rentora_api::{
    app,
    metrics::ApiMetrics,
    state::{booking_settings, payment_adapter, ports, AppState, AuthConfig},
    worker,
};
use rentora_booking::{BookingEngine, Ports};
use rentora_core::notifier::{LogNotifier, Notifier};
use rentora_core::repository::IdempotencyStore;
use rentora_store::app_config::Config;
use rentora_store::{DbClient, MemoryStore, PgStore, RedisClient};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rentora_api=debug,rentora_booking=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().expect("Failed to load config");
    tracing::info!("Starting Rentora API on port {}", config.server.port);

    // Redis: idempotency keys and rate limiting
    let redis = match &config.redis.url {
        Some(url) => Some(Arc::new(
            RedisClient::new(url).await.expect("Failed to connect to Redis"),
        )),
        None => {
            tracing::warn!("No redis.url configured: in-process idempotency keys, rate limiting off");
            None
        }
    };
    let idempotency: Arc<dyn IdempotencyStore> = match &redis {
        Some(client) => client.clone(),
        None => Arc::new(MemoryStore::new()),
    };

    let payments = payment_adapter(&config.payments).expect("Failed to set up payments");
    let events = notifier(&config);

    let wiring: Ports = match &config.database.url {
        Some(_) => {
            let db = DbClient::connect(&config.database)
                .await
                .expect("Failed to connect to Postgres");
            ports(Arc::new(PgStore::new(db.pool)), idempotency, payments, events)
        }
        None => {
            tracing::warn!("No database.url configured: reservations are kept in memory");
            ports(Arc::new(MemoryStore::new()), idempotency, payments, events)
        }
    };

    let engine = BookingEngine::new(wiring, booking_settings(&config.business_rules));

    let app_state = AppState {
        engine: Arc::new(engine),
        redis,
        metrics: Arc::new(ApiMetrics::new().expect("Failed to register metrics")),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
            webhook_secret: config.payments.webhook_secret.clone(),
        },
        business_rules: config.business_rules.clone(),
    };

    tokio::spawn(worker::start_reaper_worker(
        app_state.clone(),
        tokio::time::Duration::from_secs(config.business_rules.reaper_sweep_seconds.max(1)),
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .unwrap();
}

#[cfg(feature = "kafka")]
fn notifier(config: &Config) -> Arc<dyn Notifier> {
    use rentora_store::{EventProducer, KafkaNotifier};

    match &config.kafka.brokers {
        Some(brokers) => {
            let producer = EventProducer::new(brokers).expect("Failed to create Kafka producer");
            Arc::new(KafkaNotifier::new(producer, config.kafka.notification_topic.clone()))
        }
        None => Arc::new(LogNotifier),
    }
}

#[cfg(not(feature = "kafka"))]
fn notifier(config: &Config) -> Arc<dyn Notifier> {
    if config.kafka.brokers.is_some() {
        tracing::warn!("kafka.brokers is set but this build lacks the `kafka` feature; logging notifications");
    }
    Arc::new(LogNotifier)
}
