//! Downstream event bus for acked decisions.
//!
//! Delivery is at-least-once; consumers dedupe on `decision_id`. The
//! production adapter publishes to a Redis stream topic keyed by
//! transaction id, which gives per-key ordering the same way a partitioned
//! bus would.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

use cge_schemas::DecisionEvent;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("event publish failed: {0}")]
    PublishFailed(String),
}

#[async_trait]
pub trait DecisionBus: Send + Sync {
    /// Publish one decision event under `key` and await the broker ack.
    async fn publish(&self, key: &str, event: &DecisionEvent) -> Result<(), BusError>;
}

// ---------------------------------------------------------------------------
// RedisStreamBus
// ---------------------------------------------------------------------------

/// Stream-topic bus adapter. XADD's returned id is the broker ack.
#[derive(Clone)]
pub struct RedisStreamBus {
    conn: ConnectionManager,
    topic: String,
}

impl RedisStreamBus {
    pub fn new(conn: ConnectionManager, topic: impl Into<String>) -> Self {
        Self {
            conn,
            topic: topic.into(),
        }
    }
}

#[async_trait]
impl DecisionBus for RedisStreamBus {
    async fn publish(&self, key: &str, event: &DecisionEvent) -> Result<(), BusError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| BusError::PublishFailed(format!("encode decision event: {e}")))?;
        let mut conn = self.conn.clone();
        let _id: String = conn
            .xadd(&self.topic, "*", &[("key", key), ("payload", payload.as_str())])
            .await
            .map_err(|e| BusError::PublishFailed(e.to_string()))?;
        Ok(())
    }
}
