use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use rentora_core::repository::{IdempotencyStore, StoreError, StoreResult};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. `true` while `key` stays within `limit` hits per window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

fn idempotency_key(key: &str) -> String {
    format!("idem:{}", key)
}

fn redis_err(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl IdempotencyStore for RedisClient {
    async fn claim(&self, key: &str, reservation_id: Uuid, ttl_seconds: u64) -> StoreResult<Option<Uuid>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        let key = idempotency_key(key);

        // SET NX: only the first caller binds the key
        let set: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg(reservation_id.to_string())
            .arg("NX")
            .arg("EX")
            .arg(ttl_seconds)
            .query_async(&mut conn)
            .await
            .map_err(redis_err)?;

        if set.is_some() {
            return Ok(None);
        }

        let existing: Option<String> = conn.get(&key).await.map_err(redis_err)?;
        debug!("Idempotency key {} already bound to {:?}", key, existing);
        match existing {
            Some(raw) => Uuid::parse_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Backend(format!("bad idempotency value {}: {}", raw, e))),
            // Expired between SET and GET
            None => Ok(None),
        }
    }

    async fn release(&self, key: &str) -> StoreResult<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(redis_err)?;
        conn.del::<_, ()>(idempotency_key(key)).await.map_err(redis_err)
    }
}
