//! AUTH first-match semantics against the reference CARD_AUTH ruleset.

use std::sync::Arc;

use cge_engine::{DebugConfig, Evaluator};
use cge_schemas::{DecisionAction, EngineMode, EvaluationType};
use cge_testkit::{card_auth_ruleset, card_monitoring_ruleset, tx, MemoryVelocityStore};
use cge_velocity::VelocityService;

fn evaluator() -> Evaluator {
    Evaluator::new(
        VelocityService::new(Arc::new(MemoryVelocityStore::new())),
        DebugConfig::default(),
    )
}

#[tokio::test]
async fn high_amount_declines_and_stops_at_first_match() {
    let ruleset = card_auth_ruleset("global", 1);
    let d = evaluator()
        .evaluate_auth(&tx("tx-1", 150_00, "US"), &ruleset, false)
        .await;

    assert_eq!(d.decision, DecisionAction::Decline);
    assert_eq!(d.engine_mode, EngineMode::Normal);
    assert_eq!(d.evaluation_type, EvaluationType::Auth);
    assert_eq!(d.ruleset_version, 1);
    assert_eq!(d.matched_rules.len(), 1);
    assert_eq!(d.matched_rules[0].rule_id, "high-amount");
}

#[tokio::test]
async fn low_amount_falls_through_to_default_approve() {
    let ruleset = card_auth_ruleset("global", 1);
    let d = evaluator()
        .evaluate_auth(&tx("tx-2", 50_00, "US"), &ruleset, false)
        .await;

    assert_eq!(d.decision, DecisionAction::Approve);
    assert_eq!(d.matched_rules.len(), 1);
    assert_eq!(d.matched_rules[0].rule_id, "default");
}

#[tokio::test]
async fn later_rules_never_replace_an_earlier_match() {
    // amount > 100 AND country in [NG]: only the higher-priority rule may
    // appear in matched_rules on the auth path.
    let ruleset = card_auth_ruleset("global", 1);
    let d = evaluator()
        .evaluate_auth(&tx("tx-3", 150_00, "NG"), &ruleset, false)
        .await;

    assert_eq!(d.decision, DecisionAction::Decline);
    assert_eq!(d.matched_rules.len(), 1);
    assert_eq!(d.matched_rules[0].rule_id, "high-amount");
}

#[tokio::test]
async fn no_matching_rule_approves_in_normal_mode() {
    // The monitoring fixture has no default rule; a quiet US transaction
    // matches nothing.
    let ruleset = card_monitoring_ruleset("global", 1);
    let d = evaluator()
        .evaluate_auth(&tx("tx-4", 50_00, "US"), &ruleset, false)
        .await;

    assert_eq!(d.decision, DecisionAction::Approve);
    assert_eq!(d.engine_mode, EngineMode::Normal);
    assert!(d.matched_rules.is_empty());
    assert!(d.engine_error_code.is_none());
}

#[tokio::test]
async fn disabled_rule_never_contributes() {
    let mut ruleset = card_auth_ruleset("global", 1);
    ruleset.rules[0].enabled = false; // high-amount

    let d = evaluator()
        .evaluate_auth(&tx("tx-5", 150_00, "US"), &ruleset, false)
        .await;

    // amount > 100 so neither hr-country nor default matches either.
    assert_eq!(d.decision, DecisionAction::Approve);
    assert!(d.matched_rules.iter().all(|m| m.rule_id != "high-amount"));
    assert!(d.matched_rules.is_empty());
}

#[tokio::test]
async fn panicking_predicate_fails_open() {
    let mut ruleset = card_auth_ruleset("global", 1);
    ruleset.rules[0].predicate = Some(cge_schemas::CompiledPredicate::new(|_| {
        panic!("compiled predicate bug")
    }));

    let d = evaluator()
        .evaluate_auth(&tx("tx-6", 150_00, "US"), &ruleset, false)
        .await;

    assert_eq!(d.engine_mode, EngineMode::FailOpen);
    assert_eq!(d.decision, DecisionAction::Approve);
    assert_eq!(
        d.engine_error_code,
        Some(cge_schemas::EngineErrorCode::EvaluationError)
    );
}

#[tokio::test]
async fn healthy_predicate_replaces_condition_evaluation() {
    let mut ruleset = card_auth_ruleset("global", 1);
    // Conditions say amount > 100; the predicate overrides and matches
    // nothing, so a 150 transaction falls through to hr-country/default.
    ruleset.rules[0].predicate = Some(cge_schemas::CompiledPredicate::new(|_| false));

    let d = evaluator()
        .evaluate_auth(&tx("tx-7", 150_00, "NG"), &ruleset, false)
        .await;

    assert_eq!(d.decision, DecisionAction::Decline);
    assert_eq!(d.matched_rules[0].rule_id, "hr-country");
}
