use rentora_catalog::{OverlapPolicy, PricingConfig};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub business_rules: BusinessRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Platform service fee, percent of the rental subtotal
    pub service_fee_percent: Decimal,
    /// PENDING reservations older than this are purged
    pub stale_pending_minutes: i64,
    /// How often the background sweep runs
    pub reaper_sweep_seconds: u64,
    pub processing_fee_percent: Decimal,
    pub processing_fee_fixed: Decimal,
    pub overlap_policy: OverlapPolicy,
    pub idempotency_ttl_seconds: u64,
    pub currency: String,
    /// Requests per minute per client, enforced only when Redis is configured
    pub rate_limit_per_minute: i64,
}

impl Default for BusinessRules {
    fn default() -> Self {
        Self {
            service_fee_percent: Decimal::new(5, 0),
            stale_pending_minutes: 30,
            reaper_sweep_seconds: 60,
            processing_fee_percent: Decimal::new(29, 1),
            processing_fee_fixed: Decimal::ZERO,
            overlap_policy: OverlapPolicy::Inclusive,
            idempotency_ttl_seconds: 86_400,
            currency: "USD".to_string(),
            rate_limit_per_minute: 120,
        }
    }
}

impl BusinessRules {
    pub fn pricing(&self) -> PricingConfig {
        PricingConfig {
            service_fee_percent: self.service_fee_percent,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Without a URL the service runs on the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a request waits for a pooled connection
    pub acquire_timeout_seconds: u64,
    /// Apply pending migrations at startup
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            min_connections: 0,
            acquire_timeout_seconds: 3,
            run_migrations: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    /// In-process stand-in: every intent reads back as paid.
    Mock,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PaymentsConfig {
    /// Unset by default so a deployment has to name its processor.
    pub provider: Option<PaymentProvider>,
    /// Expected in the `X-Webhook-Secret` header of processor callbacks.
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: Option<String>,
    pub notification_topic: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: None,
            notification_topic: "rentora.notifications".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `RENTORA__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("RENTORA").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let raw = r#"
            [server]
            port = 8080

            [auth]
            jwt_secret = "secret"

            [business_rules]
            service_fee_percent = 7.5
            stale_pending_minutes = 15
            reaper_sweep_seconds = 30
            processing_fee_percent = 2.9
            processing_fee_fixed = 0.30
            overlap_policy = "half_open"
            idempotency_ttl_seconds = 60
            currency = "EUR"
            rate_limit_per_minute = 10
        "#;

        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert!(config.database.url.is_none());
        assert!(config.redis.url.is_none());
        assert_eq!(config.kafka.notification_topic, "rentora.notifications");
        assert_eq!(config.business_rules.overlap_policy, OverlapPolicy::HalfOpen);
        assert_eq!(config.business_rules.pricing().service_fee_percent, dec!(7.5));
        assert_eq!(config.business_rules.processing_fee_fixed, dec!(0.30));
        assert!(config.payments.provider.is_none());
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.database.acquire_timeout_seconds, 3);
        assert!(config.database.run_migrations);
    }

    #[test]
    fn test_payments_and_pool_settings_parse() {
        let raw = r#"
            [server]
            port = 8080

            [auth]
            jwt_secret = "secret"

            [database]
            url = "postgres://localhost/rentora"
            max_connections = 20
            acquire_timeout_seconds = 10

            [payments]
            provider = "mock"
            webhook_secret = "whsec"
        "#;

        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(raw, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.payments.provider, Some(PaymentProvider::Mock));
        assert_eq!(config.payments.webhook_secret.as_deref(), Some("whsec"));
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.database.min_connections, 0);
        assert_eq!(config.database.acquire_timeout_seconds, 10);

        let unknown = config::Config::builder()
            .add_source(config::File::from_str(
                "[server]\nport = 1\n[auth]\njwt_secret = \"s\"\n[payments]\nprovider = \"stripe\"\n",
                FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize::<Config>();
        assert!(unknown.is_err());
    }
}
