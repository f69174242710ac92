//! cge-velocity
//!
//! Rolling-window velocity counters keyed per
//! (ruleset_key, rule_id, dimension, dimension_value). Fixed window buckets
//! with a 2x-window TTL: a counter key embeds its bucket index, so a window
//! edge can transiently see up to 2x the threshold. That trade is accepted;
//! the engine's fail-open contract documents it.

use std::sync::Arc;

use chrono::Utc;
use sha2::{Digest, Sha256};

use cge_schemas::{Transaction, VelocityConfig, VelocityResult};

mod store;

pub use store::{RedisVelocityStore, VelocityError, VelocityStore};

/// Hex prefix length for dimension-value fingerprints. Long enough to avoid
/// accidental collisions in counter keys, short enough to keep keys compact.
const FINGERPRINT_HEX_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Key derivation
// ---------------------------------------------------------------------------

/// Deterministic counter key:
/// `vel:{ruleset_key}:{rule_id}:{dimension}:{value_hash}:{window_bucket}`.
///
/// The raw dimension value (a card hash, a device id) never reaches the
/// store; only its SHA-256 prefix does.
pub fn build_key(
    ruleset_key: &str,
    rule_id: &str,
    cfg: &VelocityConfig,
    dimension_value: &str,
    now_seconds: i64,
) -> (String, u64, String) {
    let fingerprint = fingerprint(dimension_value);
    let bucket = window_bucket(now_seconds, cfg.window_seconds);
    let key = format!(
        "vel:{}:{}:{}:{}:{}",
        ruleset_key, rule_id, cfg.dimension, fingerprint, bucket
    );
    (key, bucket, fingerprint)
}

/// Fixed bucket index: `floor(now_seconds / window_seconds)`.
pub fn window_bucket(now_seconds: i64, window_seconds: u64) -> u64 {
    let now = now_seconds.max(0) as u64;
    now / window_seconds.max(1)
}

fn fingerprint(dimension_value: &str) -> String {
    let digest = Sha256::digest(dimension_value.as_bytes());
    let mut hexed = hex::encode(digest);
    hexed.truncate(FINGERPRINT_HEX_LEN);
    hexed
}

// ---------------------------------------------------------------------------
// VelocityService
// ---------------------------------------------------------------------------

/// Velocity checks over a pluggable counter store.
#[derive(Clone)]
pub struct VelocityService {
    store: Arc<dyn VelocityStore>,
}

impl VelocityService {
    pub fn new(store: Arc<dyn VelocityStore>) -> Self {
        Self { store }
    }

    /// Increment-and-check for the hot path. Extracts the dimension value
    /// from the transaction, bumps the bucket counter, and reports count vs
    /// threshold. Returns `Ok(None)` when the transaction has no value for
    /// the configured dimension (the counter cannot exist, so the velocity
    /// predicate cannot fire).
    pub async fn check(
        &self,
        ruleset_key: &str,
        rule_id: &str,
        cfg: &VelocityConfig,
        tx: &Transaction,
    ) -> Result<Option<VelocityResult>, VelocityError> {
        let Some(value) = tx.field_text(&cfg.dimension) else {
            return Ok(None);
        };
        let (key, bucket, fingerprint) =
            build_key(ruleset_key, rule_id, cfg, &value, Utc::now().timestamp());

        let count = self
            .store
            .incr_with_ttl(&key, cfg.window_seconds.saturating_mul(2))
            .await?;

        Ok(Some(VelocityResult {
            dimension: cfg.dimension.clone(),
            key_fingerprint: fingerprint,
            current_count: count,
            threshold: cfg.threshold,
            window_seconds: cfg.window_seconds,
            window_bucket: bucket,
        }))
    }

    /// Same key, no mutation — replay must not double-count. Absent counter
    /// reads as 0.
    pub async fn check_read_only(
        &self,
        ruleset_key: &str,
        rule_id: &str,
        cfg: &VelocityConfig,
        tx: &Transaction,
    ) -> Result<Option<VelocityResult>, VelocityError> {
        let Some(value) = tx.field_text(&cfg.dimension) else {
            return Ok(None);
        };
        let (key, bucket, fingerprint) =
            build_key(ruleset_key, rule_id, cfg, &value, Utc::now().timestamp());

        let count = self.store.read_count(&key).await?;

        Ok(Some(VelocityResult {
            dimension: cfg.dimension.clone(),
            key_fingerprint: fingerprint,
            current_count: count,
            threshold: cfg.threshold,
            window_seconds: cfg.window_seconds,
            window_bucket: bucket,
        }))
    }
}
