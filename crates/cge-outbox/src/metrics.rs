//! Counters and gauges for the durability pipeline, all plain atomics so
//! the hot path and both workers write without locks. A snapshot view is
//! surfaced by the status endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct OutboxMetrics {
    pub appended: AtomicU64,
    pub append_retries: AtomicU64,
    pub published: AtomicU64,
    pub publish_failures: AtomicU64,
    pub reclaimed: AtomicU64,
    pub last_publish_latency_ms: AtomicU64,
    /// Enqueue-to-publish lag of the most recently acked entry.
    pub last_publish_lag_ms: AtomicU64,
    pub pending_total: AtomicU64,
    pub pending_oldest_idle_ms: AtomicU64,
}

impl OutboxMetrics {
    pub fn snapshot(&self) -> OutboxMetricsSnapshot {
        OutboxMetricsSnapshot {
            appended: self.appended.load(Ordering::Relaxed),
            append_retries: self.append_retries.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
            last_publish_latency_ms: self.last_publish_latency_ms.load(Ordering::Relaxed),
            last_publish_lag_ms: self.last_publish_lag_ms.load(Ordering::Relaxed),
            pending_total: self.pending_total.load(Ordering::Relaxed),
            pending_oldest_idle_ms: self.pending_oldest_idle_ms.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct OutboxMetricsSnapshot {
    pub appended: u64,
    pub append_retries: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub reclaimed: u64,
    pub last_publish_latency_ms: u64,
    pub last_publish_lag_ms: u64,
    pub pending_total: u64,
    pub pending_oldest_idle_ms: u64,
}
