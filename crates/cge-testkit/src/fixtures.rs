//! Shared fixtures: the canonical card-auth / card-monitoring rulesets used
//! across scenario tests, and a transaction builder.

use std::collections::BTreeMap;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use cge_schemas::{
    Condition, ConditionOperator, Decision, DecisionAction, DecisionEvent, EngineMode,
    EvaluationType, MatchedRule, Rule, Ruleset, TimingBreakdown, Transaction, AUTH_RULESET_KEY,
    MONITORING_RULESET_KEY,
};

/// Transaction with the fields most rules key on. Amount is given in cents
/// to keep call sites integral.
pub fn tx(id: &str, amount_cents: i64, country: &str) -> Transaction {
    let mut t = Transaction::new(id, Utc::now());
    t.amount = Some(Decimal::new(amount_cents, 2));
    t.country_code = Some(country.to_string());
    t.card_hash = Some(format!("card-{id}"));
    t
}

/// A NORMAL-mode auth decision event for outbox tests, keyed by `id`.
pub fn decision_event(id: &str) -> DecisionEvent {
    let transaction = tx(id, 150_00, "US");
    let decision = Decision {
        decision: DecisionAction::Decline,
        evaluation_type: EvaluationType::Auth,
        ruleset_key: AUTH_RULESET_KEY.to_string(),
        ruleset_version: 1,
        transaction_id: transaction.transaction_id.clone(),
        decision_id: Uuid::new_v4(),
        engine_mode: EngineMode::Normal,
        engine_error_code: None,
        engine_error_message: None,
        matched_rules: vec![MatchedRule {
            rule_id: "high-amount".to_string(),
            rule_name: "high-amount".to_string(),
            priority: 100,
            action: DecisionAction::Decline,
            velocity_exceeded: false,
        }],
        velocity_results: BTreeMap::new(),
        timing: TimingBreakdown::default(),
        debug_info: None,
        transaction_context: None,
    };
    DecisionEvent {
        decision,
        transaction,
        enqueued_at_ms: Utc::now().timestamp_millis(),
    }
}

/// Bare enabled rule with no conditions (matches everything).
pub fn rule(id: &str, priority: i32, action: DecisionAction) -> Rule {
    Rule {
        id: id.to_string(),
        name: id.to_string(),
        priority,
        enabled: true,
        action,
        conditions: Vec::new(),
        velocity: None,
        predicate: None,
    }
}

/// The reference CARD_AUTH ruleset:
/// - `high-amount` (prio 100): amount > 100 -> DECLINE
/// - `hr-country`  (prio 90):  country_code in [NG, RU] -> DECLINE
/// - `default`     (prio 10):  amount <= 100 -> APPROVE
pub fn card_auth_ruleset(country: &str, version: u32) -> Ruleset {
    let mut high_amount = rule("high-amount", 100, DecisionAction::Decline);
    high_amount.conditions = vec![Condition::new(
        "amount",
        ConditionOperator::Gt,
        json!(100),
    )];

    let mut hr_country = rule("hr-country", 90, DecisionAction::Decline);
    hr_country.conditions = vec![Condition::with_values(
        "country_code",
        ConditionOperator::In,
        vec![json!("NG"), json!("RU")],
    )];

    let mut default = rule("default", 10, DecisionAction::Approve);
    default.conditions = vec![Condition::new(
        "amount",
        ConditionOperator::Lte,
        json!(100),
    )];

    Ruleset {
        key: AUTH_RULESET_KEY.to_string(),
        version,
        country: country.to_string(),
        evaluation_type: EvaluationType::Auth,
        rules: vec![high_amount, hr_country, default],
    }
}

/// CARD_MONITORING counterpart: same high-amount / hr-country pair, no
/// default rule (monitoring never decides).
pub fn card_monitoring_ruleset(country: &str, version: u32) -> Ruleset {
    let mut high_amount = rule("high-amount", 100, DecisionAction::Decline);
    high_amount.conditions = vec![Condition::new(
        "amount",
        ConditionOperator::Gt,
        json!(100),
    )];

    let mut hr_country = rule("hr-country", 90, DecisionAction::Decline);
    hr_country.conditions = vec![Condition::with_values(
        "country_code",
        ConditionOperator::In,
        vec![json!("NG"), json!("RU")],
    )];

    Ruleset {
        key: MONITORING_RULESET_KEY.to_string(),
        version,
        country: country.to_string(),
        evaluation_type: EvaluationType::Monitoring,
        rules: vec![high_amount, hr_country],
    }
}
