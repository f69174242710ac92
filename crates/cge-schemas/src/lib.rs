//! cge-schemas
//!
//! Shared wire and domain types for the card authorization decision engine:
//! the transaction envelope, compiled rulesets, the decision envelope, and
//! the outbox/bus event shape. Pure data — no IO, no clocks, no engine logic.

mod decision;
mod ruleset;
mod transaction;

pub use decision::{
    ConditionEvaluation, DebugInfo, Decision, DecisionEvent, EngineErrorCode, EngineMode,
    MatchedRule, TimingBreakdown, VelocityResult,
};
pub use ruleset::{
    CompiledPredicate, Condition, ConditionOperator, DecisionAction, EvaluationType, Rule, Ruleset,
    VelocityConfig,
};
pub use transaction::{FieldLookup, FieldValue, Transaction};

/// Event-bus topic every acked decision is published to. Keyed by
/// `transaction_id`; consumers dedupe on `decision_id`.
pub const DECISION_TOPIC: &str = "fraud.card.decisions.v1";

/// Ruleset key consulted by the synchronous authorization path.
pub const AUTH_RULESET_KEY: &str = "CARD_AUTH";

/// Ruleset key consulted by the monitoring (all-match analytics) path.
pub const MONITORING_RULESET_KEY: &str = "CARD_MONITORING";
