//! The durable decision stream: an append-only log with consumer-group
//! semantics and pending (delivered-but-unacked) tracking.
//!
//! Per entry the lifecycle is PENDING -> IN_FLIGHT -> ACKED; an entry left
//! in flight (worker crash, bus outage) becomes reclaimable once idle long
//! enough. Terminal on ack only.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamPendingCountReply,
    StreamPendingReply, StreamReadOptions, StreamReadReply,
};
use redis::AsyncCommands;
use thiserror::Error;
use tracing::warn;

use cge_schemas::DecisionEvent;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream unavailable: {0}")]
    Unavailable(String),
    #[error("stream entry malformed: {0}")]
    Malformed(String),
}

/// One delivered stream entry. `id` carries the stream's own millisecond
/// timestamp prefix (`{ms}-{seq}`), which the publisher uses for lag.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: String,
    pub event: DecisionEvent,
}

/// Backlog sample: how many entries are delivered-but-unacked, and how long
/// the oldest of them has been idle.
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingSummary {
    pub total_pending: u64,
    pub oldest_idle_ms: u64,
}

#[async_trait]
pub trait DecisionStream: Send + Sync {
    /// Durable append. Returns the assigned entry id.
    async fn append(&self, event: &DecisionEvent) -> Result<String, StreamError>;

    /// Next undelivered batch for this consumer.
    async fn read_batch(&self, count: usize) -> Result<Vec<StreamEntry>, StreamError>;

    /// Take over pending entries idle for at least `min_idle_ms` (up to
    /// `count`), re-delivering them to this consumer.
    async fn claim_idle(&self, min_idle_ms: u64, count: usize)
        -> Result<Vec<StreamEntry>, StreamError>;

    /// Terminal acknowledgement.
    async fn ack(&self, entry_id: &str) -> Result<(), StreamError>;

    async fn pending_summary(&self) -> Result<PendingSummary, StreamError>;
}

/// Millisecond timestamp embedded in a stream entry id (`{ms}-{seq}`).
pub fn entry_id_millis(entry_id: &str) -> Option<i64> {
    entry_id.split('-').next()?.parse().ok()
}

// ---------------------------------------------------------------------------
// RedisDecisionStream
// ---------------------------------------------------------------------------

const PAYLOAD_FIELD: &str = "payload";

/// Redis Streams implementation: XADD / XREADGROUP / XAUTOCLAIM / XACK /
/// XPENDING on a single stream key and consumer group.
#[derive(Clone)]
pub struct RedisDecisionStream {
    conn: ConnectionManager,
    stream_key: String,
    group: String,
    consumer: String,
}

impl RedisDecisionStream {
    pub fn new(
        conn: ConnectionManager,
        stream_key: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            conn,
            stream_key: stream_key.into(),
            group: group.into(),
            consumer: consumer.into(),
        }
    }

    /// Create the consumer group if it does not exist yet. An already
    /// existing group (BUSYGROUP) is fine — boot is idempotent.
    pub async fn ensure_group(&self) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let created: Result<(), redis::RedisError> = conn
            .xgroup_create_mkstream(&self.stream_key, &self.group, "$")
            .await;
        match created {
            Ok(()) => Ok(()),
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(StreamError::Unavailable(e.to_string())),
        }
    }

    fn decode(&self, id: StreamId) -> Result<StreamEntry, StreamError> {
        let raw: String = id.get(PAYLOAD_FIELD).ok_or_else(|| {
            StreamError::Malformed(format!("entry {} has no {PAYLOAD_FIELD} field", id.id))
        })?;
        let event: DecisionEvent = serde_json::from_str(&raw)
            .map_err(|e| StreamError::Malformed(format!("entry {}: {e}", id.id)))?;
        Ok(StreamEntry { id: id.id, event })
    }

    fn decode_batch(&self, ids: Vec<StreamId>) -> Vec<StreamEntry> {
        // A malformed entry is logged and skipped, not allowed to wedge the
        // consumer on every reclaim pass.
        ids.into_iter()
            .filter_map(|id| match self.decode(id) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping malformed outbox entry");
                    None
                }
            })
            .collect()
    }
}

#[async_trait]
impl DecisionStream for RedisDecisionStream {
    async fn append(&self, event: &DecisionEvent) -> Result<String, StreamError> {
        let payload = serde_json::to_string(event)
            .map_err(|e| StreamError::Malformed(format!("encode decision event: {e}")))?;
        let mut conn = self.conn.clone();
        conn.xadd(&self.stream_key, "*", &[(PAYLOAD_FIELD, payload)])
            .await
            .map_err(|e| StreamError::Unavailable(e.to_string()))
    }

    async fn read_batch(&self, count: usize) -> Result<Vec<StreamEntry>, StreamError> {
        let mut conn = self.conn.clone();
        let opts = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(count);
        let reply: StreamReadReply = conn
            .xread_options(&[&self.stream_key], &[">"], &opts)
            .await
            .map_err(|e| StreamError::Unavailable(e.to_string()))?;

        let ids = reply.keys.into_iter().flat_map(|k| k.ids).collect();
        Ok(self.decode_batch(ids))
    }

    async fn claim_idle(
        &self,
        min_idle_ms: u64,
        count: usize,
    ) -> Result<Vec<StreamEntry>, StreamError> {
        let mut conn = self.conn.clone();
        let opts = StreamAutoClaimOptions::default().count(count);
        let reply: StreamAutoClaimReply = conn
            .xautoclaim_options(
                &self.stream_key,
                &self.group,
                &self.consumer,
                min_idle_ms,
                "0-0",
                opts,
            )
            .await
            .map_err(|e| StreamError::Unavailable(e.to_string()))?;

        Ok(self.decode_batch(reply.claimed))
    }

    async fn ack(&self, entry_id: &str) -> Result<(), StreamError> {
        let mut conn = self.conn.clone();
        let _acked: u64 = conn
            .xack(&self.stream_key, &self.group, &[entry_id])
            .await
            .map_err(|e| StreamError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn pending_summary(&self) -> Result<PendingSummary, StreamError> {
        let mut conn = self.conn.clone();
        let reply: StreamPendingReply = conn
            .xpending(&self.stream_key, &self.group)
            .await
            .map_err(|e| StreamError::Unavailable(e.to_string()))?;

        let total_pending = match &reply {
            StreamPendingReply::Empty => 0,
            StreamPendingReply::Data(data) => data.count as u64,
        };
        if total_pending == 0 {
            return Ok(PendingSummary::default());
        }

        // Extended form for the oldest entry's idle duration.
        let detail: StreamPendingCountReply = conn
            .xpending_count(&self.stream_key, &self.group, "-", "+", 1)
            .await
            .map_err(|e| StreamError::Unavailable(e.to_string()))?;
        let oldest_idle_ms = detail
            .ids
            .first()
            .map(|p| p.last_delivered_ms as u64)
            .unwrap_or_default();

        Ok(PendingSummary {
            total_pending,
            oldest_idle_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_id_millis_parses_the_prefix() {
        assert_eq!(entry_id_millis("1700000000123-0"), Some(1_700_000_000_123));
        assert_eq!(entry_id_millis("garbage"), None);
    }
}
