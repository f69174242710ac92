//! Stream consumer: publishes each durable decision to the event bus and
//! acks the stream entry.
//!
//! Per tick: reclaim entries another (likely dead) consumer left idle, read
//! the next fresh batch, publish each with a synchronous ack-awaited send.
//! Publish failure leaves the entry unacked — it comes back through the
//! reclaim path. Periodically the pending backlog is sampled into metrics.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::bus::DecisionBus;
use crate::metrics::OutboxMetrics;
use crate::stream::{entry_id_millis, DecisionStream, StreamEntry};

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub poll_interval_ms: u64,
    pub read_batch_count: usize,
    pub pending_min_idle_ms: u64,
    pub pending_claim_count: usize,
    pub pending_summary_interval_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            read_batch_count: 100,
            pending_min_idle_ms: 60_000,
            pending_claim_count: 50,
            pending_summary_interval_ms: 30_000,
        }
    }
}

pub struct PublisherWorker {
    stream: Arc<dyn DecisionStream>,
    bus: Arc<dyn DecisionBus>,
    metrics: Arc<OutboxMetrics>,
    cfg: PublisherConfig,
}

impl PublisherWorker {
    pub fn new(
        stream: Arc<dyn DecisionStream>,
        bus: Arc<dyn DecisionBus>,
        metrics: Arc<OutboxMetrics>,
        cfg: PublisherConfig,
    ) -> Self {
        Self {
            stream,
            bus,
            metrics,
            cfg,
        }
    }

    pub async fn run(self) {
        info!("publisher worker started");
        let mut ticker = tokio::time::interval(Duration::from_millis(self.cfg.poll_interval_ms));
        let mut last_summary = Instant::now();

        loop {
            ticker.tick().await;
            self.tick().await;

            if last_summary.elapsed()
                >= Duration::from_millis(self.cfg.pending_summary_interval_ms)
            {
                self.sample_backlog().await;
                last_summary = Instant::now();
            }
        }
    }

    /// One poll cycle: reclaimed entries first (they are oldest), then the
    /// fresh batch.
    pub async fn tick(&self) {
        let claimed = match self
            .stream
            .claim_idle(self.cfg.pending_min_idle_ms, self.cfg.pending_claim_count)
            .await
        {
            Ok(entries) => {
                if !entries.is_empty() {
                    self.metrics
                        .reclaimed
                        .fetch_add(entries.len() as u64, Ordering::Relaxed);
                    debug!(count = entries.len(), "reclaimed idle pending entries");
                }
                entries
            }
            Err(e) => {
                warn!(error = %e, "pending reclaim failed");
                Vec::new()
            }
        };

        let fresh = match self.stream.read_batch(self.cfg.read_batch_count).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "stream read failed");
                Vec::new()
            }
        };

        for entry in claimed.into_iter().chain(fresh) {
            self.publish_entry(entry).await;
        }
    }

    async fn publish_entry(&self, entry: StreamEntry) {
        let key = entry.event.transaction.transaction_id.clone();
        let started = Instant::now();

        match self.bus.publish(&key, &entry.event).await {
            Ok(()) => {
                let latency_ms = started.elapsed().as_millis() as u64;
                self.metrics
                    .last_publish_latency_ms
                    .store(latency_ms, Ordering::Relaxed);

                if let Err(e) = self.stream.ack(&entry.id).await {
                    // Unacked: the entry returns via reclaim. Duplicate
                    // publishes are the consumer's problem (idempotent on
                    // decision_id).
                    warn!(entry_id = %entry.id, error = %e, "ack failed after publish");
                    return;
                }

                self.metrics.published.fetch_add(1, Ordering::Relaxed);
                if let Some(entry_ms) = entry_id_millis(&entry.id) {
                    let lag_ms = (Utc::now().timestamp_millis() - entry_ms).max(0) as u64;
                    self.metrics
                        .last_publish_lag_ms
                        .store(lag_ms, Ordering::Relaxed);
                }
            }
            Err(e) => {
                self.metrics.publish_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    entry_id = %entry.id,
                    transaction_id = %key,
                    error = %e,
                    "event publish failed; entry left pending"
                );
            }
        }
    }

    async fn sample_backlog(&self) {
        match self.stream.pending_summary().await {
            Ok(summary) => {
                self.metrics
                    .pending_total
                    .store(summary.total_pending, Ordering::Relaxed);
                self.metrics
                    .pending_oldest_idle_ms
                    .store(summary.oldest_idle_ms, Ordering::Relaxed);
                info!(
                    total_pending = summary.total_pending,
                    oldest_idle_ms = summary.oldest_idle_ms,
                    "outbox backlog"
                );
            }
            Err(e) => warn!(error = %e, "backlog sample failed"),
        }
    }
}
