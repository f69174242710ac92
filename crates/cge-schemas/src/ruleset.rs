use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transaction::Transaction;

// ---------------------------------------------------------------------------
// DecisionAction / EvaluationType
// ---------------------------------------------------------------------------

/// The decision a rule (or the engine) takes on a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    Approve,
    Decline,
    Review,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionAction::Approve => "APPROVE",
            DecisionAction::Decline => "DECLINE",
            DecisionAction::Review => "REVIEW",
        }
    }

    /// Normalizing parse for the monitoring input decision: case-insensitive,
    /// surrounding whitespace ignored. Only APPROVE and DECLINE are valid as
    /// an upstream decision; REVIEW parses but the boundary rejects it.
    pub fn parse_normalized(s: &str) -> Option<DecisionAction> {
        match s.trim().to_ascii_uppercase().as_str() {
            "APPROVE" => Some(DecisionAction::Approve),
            "DECLINE" => Some(DecisionAction::Decline),
            "REVIEW" => Some(DecisionAction::Review),
            _ => None,
        }
    }
}

impl fmt::Display for DecisionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which evaluation algorithm a ruleset is compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationType {
    Auth,
    Monitoring,
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// Condition operator algebra. Scalar operators take `value`; `in`, `not_in`
/// and `between` take `values`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Between,
    Contains,
    StartsWith,
    EndsWith,
    Exists,
}

/// One predicate over a single transaction field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value: Some(value),
            values: None,
        }
    }

    pub fn with_values(field: impl Into<String>, op: ConditionOperator, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: None,
            values: Some(values),
        }
    }
}

// ---------------------------------------------------------------------------
// VelocityConfig
// ---------------------------------------------------------------------------

/// Rolling-window counter attached to a rule. `dimension` names the
/// transaction field whose value is counted (`card_hash`, `device_id`,
/// `merchant_id`, ...). On exceedance, `action` replaces the rule action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VelocityConfig {
    pub dimension: String,
    pub window_seconds: u64,
    pub threshold: u64,
    pub action: DecisionAction,
}

// ---------------------------------------------------------------------------
// Rule
// ---------------------------------------------------------------------------

/// Precompiled rule predicate. When present it replaces condition evaluation
/// entirely. Never serialized; attached in-process by whoever compiles the
/// ruleset.
#[derive(Clone)]
pub struct CompiledPredicate(pub Arc<dyn Fn(&Transaction) -> bool + Send + Sync>);

impl CompiledPredicate {
    pub fn new(f: impl Fn(&Transaction) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        (self.0)(tx)
    }
}

impl fmt::Debug for CompiledPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompiledPredicate(..)")
    }
}

/// A single compiled rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    pub priority: i32,
    pub enabled: bool,
    pub action: DecisionAction,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<VelocityConfig>,
    #[serde(skip)]
    pub predicate: Option<CompiledPredicate>,
}

// ---------------------------------------------------------------------------
// Ruleset
// ---------------------------------------------------------------------------

/// An immutable, versioned bundle of rules for one (country, key) slot.
/// New versions replace whole rulesets; nothing mutates in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ruleset {
    pub key: String,
    pub version: u32,
    /// Uppercased ISO country code, or the literal `"global"`.
    pub country: String,
    pub evaluation_type: EvaluationType,
    pub rules: Vec<Rule>,
}

impl Ruleset {
    /// Order rules for evaluation: descending priority, declaration order on
    /// ties (the sort is stable). Called once at registration so the hot
    /// path never sorts.
    pub fn with_evaluation_order(mut self) -> Self {
        self.rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(id: &str, priority: i32) -> Rule {
        Rule {
            id: id.to_string(),
            name: id.to_string(),
            priority,
            enabled: true,
            action: DecisionAction::Decline,
            conditions: Vec::new(),
            velocity: None,
            predicate: None,
        }
    }

    #[test]
    fn evaluation_order_is_descending_priority_stable_on_ties() {
        let rs = Ruleset {
            key: "CARD_AUTH".to_string(),
            version: 1,
            country: "global".to_string(),
            evaluation_type: EvaluationType::Auth,
            rules: vec![rule("low", 10), rule("first-90", 90), rule("second-90", 90)],
        }
        .with_evaluation_order();

        let ids: Vec<&str> = rs.rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["first-90", "second-90", "low"]);
    }

    #[test]
    fn actions_serialize_as_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&DecisionAction::Decline).unwrap(),
            "\"DECLINE\""
        );
        assert_eq!(
            serde_json::to_string(&EvaluationType::Monitoring).unwrap(),
            "\"MONITORING\""
        );
    }

    #[test]
    fn normalized_parse_accepts_any_casing() {
        assert_eq!(
            DecisionAction::parse_normalized(" decline "),
            Some(DecisionAction::Decline)
        );
        assert_eq!(DecisionAction::parse_normalized("nope"), None);
    }
}
