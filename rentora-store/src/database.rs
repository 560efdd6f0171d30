use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

use crate::app_config::DatabaseConfig;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("database.url is not configured")]
    MissingUrl,

    #[error(transparent)]
    Connect(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Postgres pool sized from the `database` config section.
#[derive(Clone)]
pub struct DbClient {
    pub pool: PgPool,
}

impl DbClient {
    /// Connect, then bring the schema up to date unless `run_migrations` is off.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        let url = config.url.as_deref().ok_or(DatabaseError::MissingUrl)?;
        let pool = pool_options(config).connect(url).await?;
        info!(
            "Connected to Postgres (pool {}..{})",
            config.min_connections, config.max_connections
        );

        let client = Self { pool };
        if config.run_migrations {
            client.migrate().await?;
        }
        Ok(client)
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running booking schema migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Booking schema is up to date.");
        Ok(())
    }
}

fn pool_options(config: &DatabaseConfig) -> PgPoolOptions {
    PgPoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .min_connections(config.min_connections.min(config.max_connections))
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_without_url_is_rejected() {
        let config = DatabaseConfig::default();
        assert!(matches!(
            DbClient::connect(&config).await,
            Err(DatabaseError::MissingUrl)
        ));
    }

    #[test]
    fn test_pool_options_follow_config() {
        let config = DatabaseConfig {
            url: None,
            max_connections: 12,
            min_connections: 40,
            acquire_timeout_seconds: 0,
            run_migrations: false,
        };
        let options = pool_options(&config);

        assert_eq!(options.get_max_connections(), 12);
        assert_eq!(options.get_min_connections(), 12);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(1));
    }
}
