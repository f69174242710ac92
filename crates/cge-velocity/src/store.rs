//! Counter store abstraction and the production Redis implementation.
//!
//! The contract is deliberately tiny: an atomic "increment and expire if new"
//! and a non-mutating read. Per-key atomicity is the store's problem; the
//! service layer above never compensates for races.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use thiserror::Error;

/// Raised when the backing store is unreachable or times out. Callers treat
/// this as "counter unknown" and fail open; it never aborts an evaluation.
#[derive(Debug, Error)]
pub enum VelocityError {
    #[error("velocity store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait VelocityStore: Send + Sync {
    /// Atomically increment `key`, setting `ttl_seconds` only when the key
    /// was created by this call. Returns the post-increment count.
    async fn incr_with_ttl(&self, key: &str, ttl_seconds: u64) -> Result<u64, VelocityError>;

    /// Current count without mutation. Absent key reads as 0.
    async fn read_count(&self, key: &str) -> Result<u64, VelocityError>;
}

// ---------------------------------------------------------------------------
// RedisVelocityStore
// ---------------------------------------------------------------------------

// INCR + conditional EXPIRE in one round-trip. EXPIRE only fires on first
// increment so the window TTL is anchored to bucket creation, not last write.
const INCR_WITH_TTL: &str = r#"
local c = redis.call('INCR', KEYS[1])
if c == 1 then
  redis.call('EXPIRE', KEYS[1], ARGV[1])
end
return c
"#;

/// Counter store backed by Redis. Cheap to clone; the connection manager
/// multiplexes and reconnects internally.
#[derive(Clone)]
pub struct RedisVelocityStore {
    conn: ConnectionManager,
    script: redis::Script,
}

impl RedisVelocityStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: redis::Script::new(INCR_WITH_TTL),
        }
    }
}

#[async_trait]
impl VelocityStore for RedisVelocityStore {
    async fn incr_with_ttl(&self, key: &str, ttl_seconds: u64) -> Result<u64, VelocityError> {
        let mut conn = self.conn.clone();
        self.script
            .key(key)
            .arg(ttl_seconds)
            .invoke_async::<u64>(&mut conn)
            .await
            .map_err(|e| VelocityError::Unavailable(e.to_string()))
    }

    async fn read_count(&self, key: &str) -> Result<u64, VelocityError> {
        let mut conn = self.conn.clone();
        let count: Option<u64> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| VelocityError::Unavailable(e.to_string()))?;
        Ok(count.unwrap_or(0))
    }
}
