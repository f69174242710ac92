//! Shared runtime state for cge-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. Everything inside is
//! already concurrency-safe (registry snapshots, atomic health/metrics, the
//! bounded queue), so this module holds no locks of its own.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use cge_engine::Evaluator;
use cge_outbox::{DecisionBus, OutboxHealth, OutboxMetrics, OutboxQueue};
use cge_registry::RulesetRegistry;
use cge_schemas::{Decision, DecisionEvent, Transaction};

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health / status responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Cloneable (Arc) handle shared across all Axum handlers and the
/// background workers.
pub struct AppState {
    pub build: BuildInfo,
    pub registry: Arc<RulesetRegistry>,
    pub evaluator: Evaluator,
    pub queue: Arc<OutboxQueue>,
    pub bus: Arc<dyn DecisionBus>,
    pub outbox_health: Arc<OutboxHealth>,
    pub outbox_metrics: Arc<OutboxMetrics>,
}

impl AppState {
    pub fn new(
        registry: Arc<RulesetRegistry>,
        evaluator: Evaluator,
        queue: Arc<OutboxQueue>,
        bus: Arc<dyn DecisionBus>,
        outbox_health: Arc<OutboxHealth>,
        outbox_metrics: Arc<OutboxMetrics>,
    ) -> Self {
        Self {
            build: BuildInfo {
                service: "cge-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            registry,
            evaluator,
            queue,
            bus,
            outbox_health,
            outbox_metrics,
        }
    }

    /// Hand an AUTH decision to the durability pipeline. Non-blocking; the
    /// queue drops oldest under backpressure.
    pub fn enqueue_auth(&self, transaction: Transaction, decision: Decision) {
        self.queue.enqueue(DecisionEvent {
            decision,
            transaction,
            enqueued_at_ms: Utc::now().timestamp_millis(),
        });
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}
