use std::time::Duration;

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Script};

use super::error::StoreError;

/// Deletes the key only while it still holds the expected value.
const CONSUME_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

pub fn otp_key(email: &str) -> String {
    format!("otp:{email}")
}

/// Short-lived OTP values with store-native expiry.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// `None` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    /// Last writer wins; the TTL restarts on every write.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;
    /// Atomically removes `key` iff it currently equals `expected`.
    async fn consume(&self, key: &str, expected: &str) -> Result<bool, StoreError>;
}

#[derive(Clone)]
pub struct RedisOtpStore {
    conn: ConnectionManager,
    consume: Script,
}

impl RedisOtpStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            consume: Script::new(CONSUME_SCRIPT),
        }
    }
}

#[async_trait]
impl OtpStore for RedisOtpStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn consume(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .consume
            .key(key)
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}
