//! Debug capture under sampling.
//!
//! Sampling is hash-based over `transaction_id` so a given transaction is
//! either sampled on every replica or on none; a per-request counter would
//! drift between replicas. When capture is off the evaluator carries no
//! builder and pays nothing.

use sha2::{Digest, Sha256};

use cge_schemas::{Condition, ConditionEvaluation, DebugInfo, FieldLookup};

/// Knobs for debug capture. `sample_rate` means "1 in N"; 1 captures every
/// request.
#[derive(Debug, Clone)]
pub struct DebugConfig {
    pub enabled: bool,
    pub sample_rate: u32,
    pub max_condition_evaluations: usize,
    pub include_field_values: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_rate: 100,
            max_condition_evaluations: 100,
            include_field_values: false,
        }
    }
}

impl DebugConfig {
    /// Capture-everything config for tests and replay tooling.
    pub fn capture_all() -> Self {
        Self {
            enabled: true,
            sample_rate: 1,
            max_condition_evaluations: 100,
            include_field_values: true,
        }
    }
}

/// Stable sample decision: first 8 bytes of SHA-256(transaction_id) as a
/// big-endian u64, modulo the rate.
pub fn sampled_in(cfg: &DebugConfig, transaction_id: &str) -> bool {
    if !cfg.enabled {
        return false;
    }
    let rate = u64::from(cfg.sample_rate.max(1));
    let digest = Sha256::digest(transaction_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % rate == 0
}

// ---------------------------------------------------------------------------
// DebugBuilder
// ---------------------------------------------------------------------------

/// Accumulates per-condition evaluations for one sampled request. Overflow
/// past the cap truncates silently (the flag records that it happened).
pub struct DebugBuilder {
    cap: usize,
    include_field_values: bool,
    info: DebugInfo,
}

impl DebugBuilder {
    pub fn new(cfg: &DebugConfig) -> Self {
        Self {
            cap: cfg.max_condition_evaluations,
            include_field_values: cfg.include_field_values,
            info: DebugInfo::default(),
        }
    }

    pub fn record(&mut self, rule_id: &str, cond: &Condition, input: &FieldLookup, result: bool) {
        if self.info.condition_evaluations.len() >= self.cap {
            self.info.truncated = true;
            return;
        }

        let input_value = match input {
            FieldLookup::Present(v) => Some(v.to_json()),
            FieldLookup::Absent | FieldLookup::Mismatch => None,
        };

        if self.include_field_values {
            if let Some(v) = &input_value {
                self.info
                    .field_values
                    .entry(cond.field.clone())
                    .or_insert_with(|| v.clone());
            }
        }

        self.info.condition_evaluations.push(ConditionEvaluation {
            rule_id: rule_id.to_string(),
            field: cond.field.clone(),
            op: cond.op,
            input_value,
            result,
        });
    }

    pub fn finish(self) -> DebugInfo {
        self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cge_schemas::ConditionOperator;
    use serde_json::json;

    #[test]
    fn sampling_is_deterministic_per_transaction_id() {
        let cfg = DebugConfig {
            enabled: true,
            sample_rate: 7,
            ..DebugConfig::default()
        };
        let first = sampled_in(&cfg, "tx-42");
        for _ in 0..10 {
            assert_eq!(sampled_in(&cfg, "tx-42"), first);
        }
    }

    #[test]
    fn rate_one_samples_everything_and_disabled_samples_nothing() {
        let mut cfg = DebugConfig::capture_all();
        for id in ["a", "b", "c", "tx-123"] {
            assert!(sampled_in(&cfg, id));
        }
        cfg.enabled = false;
        assert!(!sampled_in(&cfg, "a"));
    }

    #[test]
    fn overflow_truncates_silently() {
        let cfg = DebugConfig {
            enabled: true,
            sample_rate: 1,
            max_condition_evaluations: 2,
            include_field_values: false,
        };
        let mut b = DebugBuilder::new(&cfg);
        let cond = Condition::new("amount", ConditionOperator::Gt, json!(10));
        for _ in 0..5 {
            b.record("r1", &cond, &FieldLookup::Absent, false);
        }
        let info = b.finish();
        assert_eq!(info.condition_evaluations.len(), 2);
        assert!(info.truncated);
    }

    #[test]
    fn field_values_follow_the_toggle() {
        let cond = Condition::new("amount", ConditionOperator::Gt, json!(10));
        let present = FieldLookup::Present(cge_schemas::FieldValue::Number(42.into()));

        let mut with = DebugBuilder::new(&DebugConfig::capture_all());
        with.record("r1", &cond, &present, true);
        assert!(with.finish().field_values.contains_key("amount"));

        let cfg = DebugConfig {
            enabled: true,
            sample_rate: 1,
            max_condition_evaluations: 100,
            include_field_values: false,
        };
        let mut without = DebugBuilder::new(&cfg);
        without.record("r1", &cond, &present, true);
        assert!(without.finish().field_values.is_empty());
    }
}
