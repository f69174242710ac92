//! Queue drainer: moves enqueued AUTH decisions onto the durable stream.
//!
//! Every record is appended before the worker moves on; a failing append is
//! retried with bounded exponential backoff. Once the retry budget is spent
//! the shared health flag flips and the HTTP boundary starts answering 503,
//! while this worker keeps retrying — the record is not abandoned. The first
//! successful append flips health back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use cge_schemas::DecisionEvent;

use crate::metrics::OutboxMetrics;
use crate::queue::OutboxQueue;
use crate::stream::DecisionStream;

const BACKOFF_CAP_MS: u64 = 5_000;

// ---------------------------------------------------------------------------
// OutboxHealth
// ---------------------------------------------------------------------------

/// Shared availability flag between the dispatcher and the request path.
#[derive(Debug)]
pub struct OutboxHealth {
    healthy: AtomicBool,
}

impl Default for OutboxHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboxHealth {
    pub fn new() -> Self {
        Self {
            healthy: AtomicBool::new(true),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// OutboxDispatcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub append_max_retries: u32,
    pub append_backoff_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            append_max_retries: 5,
            append_backoff_ms: 50,
        }
    }
}

pub struct OutboxDispatcher {
    queue: Arc<OutboxQueue>,
    stream: Arc<dyn DecisionStream>,
    health: Arc<OutboxHealth>,
    metrics: Arc<OutboxMetrics>,
    cfg: DispatcherConfig,
}

impl OutboxDispatcher {
    pub fn new(
        queue: Arc<OutboxQueue>,
        stream: Arc<dyn DecisionStream>,
        health: Arc<OutboxHealth>,
        metrics: Arc<OutboxMetrics>,
        cfg: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            stream,
            health,
            metrics,
            cfg,
        }
    }

    /// Drain loop. Runs until the task is dropped with the process.
    pub async fn run(self) {
        info!("outbox dispatcher started");
        loop {
            let event = self.queue.pop().await;
            self.append_with_retry(&event).await;
        }
    }

    /// Append one record, retrying forever with capped backoff. The health
    /// flag flips unhealthy once the configured budget is exhausted.
    pub async fn append_with_retry(&self, event: &DecisionEvent) {
        let mut attempt: u32 = 0;
        loop {
            match self.stream.append(event).await {
                Ok(entry_id) => {
                    if !self.health.is_healthy() {
                        info!(entry_id, "outbox append recovered");
                    }
                    self.health.set_healthy(true);
                    self.metrics.appended.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    attempt = attempt.saturating_add(1);
                    self.metrics.append_retries.fetch_add(1, Ordering::Relaxed);

                    if attempt > self.cfg.append_max_retries && self.health.is_healthy() {
                        error!(
                            attempt,
                            error = %e,
                            "outbox append exhausted retry budget; marking outbox unavailable"
                        );
                        self.health.set_healthy(false);
                    } else {
                        warn!(attempt, error = %e, "outbox append failed; backing off");
                    }

                    tokio::time::sleep(backoff(self.cfg.append_backoff_ms, attempt)).await;
                }
            }
        }
    }
}

fn backoff(base_ms: u64, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(10);
    Duration::from_millis((base_ms << shift).min(BACKOFF_CAP_MS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff(50, 1), Duration::from_millis(50));
        assert_eq!(backoff(50, 2), Duration::from_millis(100));
        assert_eq!(backoff(50, 5), Duration::from_millis(800));
        assert_eq!(backoff(50, 20), Duration::from_millis(BACKOFF_CAP_MS));
    }
}
