use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ruleset::{ConditionOperator, DecisionAction, EvaluationType};
use crate::transaction::Transaction;

// ---------------------------------------------------------------------------
// EngineMode / EngineErrorCode
// ---------------------------------------------------------------------------

/// Quality tag on a decision. `FAIL_OPEN` always implies the decision is
/// APPROVE (payments are never blocked by engine unavailability).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineMode {
    Normal,
    Degraded,
    FailOpen,
}

/// Machine-readable cause attached to DEGRADED / FAIL_OPEN decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineErrorCode {
    RulesetNotLoaded,
    EvaluationError,
    RedisUnavailable,
    MissingDecision,
    InvalidDecision,
    EventPublishFailed,
    OutboxUnavailable,
}

impl EngineErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineErrorCode::RulesetNotLoaded => "RULESET_NOT_LOADED",
            EngineErrorCode::EvaluationError => "EVALUATION_ERROR",
            EngineErrorCode::RedisUnavailable => "REDIS_UNAVAILABLE",
            EngineErrorCode::MissingDecision => "MISSING_DECISION",
            EngineErrorCode::InvalidDecision => "INVALID_DECISION",
            EngineErrorCode::EventPublishFailed => "EVENT_PUBLISH_FAILED",
            EngineErrorCode::OutboxUnavailable => "OUTBOX_UNAVAILABLE",
        }
    }
}

// ---------------------------------------------------------------------------
// VelocityResult / MatchedRule
// ---------------------------------------------------------------------------

/// Outcome of one velocity counter check. `window_bucket` is the fixed
/// bucket index the count was taken in, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityResult {
    pub dimension: String,
    /// Hash prefix of the dimension value; raw values never leave the engine.
    pub key_fingerprint: String,
    pub current_count: u64,
    pub threshold: u64,
    pub window_seconds: u64,
    pub window_bucket: u64,
}

impl VelocityResult {
    pub fn exceeded(&self) -> bool {
        self.current_count > self.threshold
    }
}

/// One rule that matched during evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub rule_id: String,
    pub rule_name: String,
    pub priority: i32,
    /// The action this match contributed (velocity action on exceedance,
    /// rule action otherwise).
    pub action: DecisionAction,
    pub velocity_exceeded: bool,
}

// ---------------------------------------------------------------------------
// TimingBreakdown / DebugInfo
// ---------------------------------------------------------------------------

/// Per-stage latency, milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingBreakdown {
    pub rules_ms: f64,
    pub velocity_ms: f64,
    pub total_ms: f64,
}

/// One recorded condition evaluation (debug capture only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionEvaluation {
    pub rule_id: String,
    pub field: String,
    pub op: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_value: Option<Value>,
    pub result: bool,
}

/// Sampled-in debug payload. Capped; overflow truncates silently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub condition_evaluations: Vec<ConditionEvaluation>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_values: BTreeMap<String, Value>,
    pub truncated: bool,
}

// ---------------------------------------------------------------------------
// Decision
// ---------------------------------------------------------------------------

/// Full decision envelope produced by one evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub decision: DecisionAction,
    pub evaluation_type: EvaluationType,
    pub ruleset_key: String,
    pub ruleset_version: u32,
    pub transaction_id: String,
    pub decision_id: Uuid,
    pub engine_mode: EngineMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_error_code: Option<EngineErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_error_message: Option<String>,
    pub matched_rules: Vec<MatchedRule>,
    /// rule_id -> velocity outcome, for every velocity check that ran.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub velocity_results: BTreeMap<String, VelocityResult>,
    pub timing: TimingBreakdown,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<DebugInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_context: Option<Transaction>,
}

impl Decision {
    /// Synthesized decision for paths where evaluation cannot run at all
    /// (no ruleset, outbox unavailable). FAIL_OPEN is always APPROVE.
    pub fn fail_open(
        evaluation_type: EvaluationType,
        ruleset_key: impl Into<String>,
        transaction_id: impl Into<String>,
        code: EngineErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            decision: DecisionAction::Approve,
            evaluation_type,
            ruleset_key: ruleset_key.into(),
            ruleset_version: 0,
            transaction_id: transaction_id.into(),
            decision_id: Uuid::new_v4(),
            engine_mode: EngineMode::FailOpen,
            engine_error_code: Some(code),
            engine_error_message: Some(message.into()),
            matched_rules: Vec::new(),
            velocity_results: BTreeMap::new(),
            timing: TimingBreakdown::default(),
            debug_info: None,
            transaction_context: None,
        }
    }
}

// ---------------------------------------------------------------------------
// DecisionEvent
// ---------------------------------------------------------------------------

/// Outbox / bus payload: the decision plus the transaction it was taken on.
/// `enqueued_at_ms` is the wall-clock enqueue time used for end-to-end lag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub decision: Decision,
    pub transaction: Transaction,
    pub enqueued_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_serialize_to_contract_strings() {
        for (code, wire) in [
            (EngineErrorCode::RulesetNotLoaded, "\"RULESET_NOT_LOADED\""),
            (EngineErrorCode::RedisUnavailable, "\"REDIS_UNAVAILABLE\""),
            (EngineErrorCode::OutboxUnavailable, "\"OUTBOX_UNAVAILABLE\""),
        ] {
            assert_eq!(serde_json::to_string(&code).unwrap(), wire);
            assert_eq!(format!("\"{}\"", code.as_str()), wire);
        }
        assert_eq!(
            serde_json::to_string(&EngineMode::FailOpen).unwrap(),
            "\"FAIL_OPEN\""
        );
    }

    #[test]
    fn fail_open_is_always_approve() {
        let d = Decision::fail_open(
            EvaluationType::Auth,
            "CARD_AUTH",
            "tx-1",
            EngineErrorCode::RulesetNotLoaded,
            "no ruleset for (US, CARD_AUTH)",
        );
        assert_eq!(d.decision, DecisionAction::Approve);
        assert_eq!(d.engine_mode, EngineMode::FailOpen);
        assert!(d.matched_rules.is_empty());
    }

    #[test]
    fn exceeded_is_strictly_greater_than_threshold() {
        let mut v = VelocityResult {
            dimension: "card_hash".to_string(),
            key_fingerprint: "ab12".to_string(),
            current_count: 5,
            threshold: 5,
            window_seconds: 60,
            window_bucket: 1,
        };
        assert!(!v.exceeded());
        v.current_count = 6;
        assert!(v.exceeded());
    }
}
