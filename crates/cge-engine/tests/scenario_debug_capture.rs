//! Debug capture end-to-end: sampled requests carry per-condition traces,
//! unsampled requests pay nothing and carry nothing.

use std::sync::Arc;

use cge_engine::{DebugConfig, Evaluator};
use cge_testkit::{card_auth_ruleset, tx, MemoryVelocityStore};
use cge_velocity::VelocityService;

fn evaluator(debug: DebugConfig) -> Evaluator {
    Evaluator::new(
        VelocityService::new(Arc::new(MemoryVelocityStore::new())),
        debug,
    )
}

#[tokio::test]
async fn sampled_request_records_condition_evaluations_and_field_values() {
    let ev = evaluator(DebugConfig::capture_all());
    let ruleset = card_auth_ruleset("global", 1);

    let d = ev.evaluate_auth(&tx("tx-1", 150_00, "US"), &ruleset, false).await;

    let info = d.debug_info.expect("sampled request must carry debug info");
    // First-match: only the high-amount condition ran.
    assert_eq!(info.condition_evaluations.len(), 1);
    assert_eq!(info.condition_evaluations[0].rule_id, "high-amount");
    assert!(info.condition_evaluations[0].result);
    assert!(info.field_values.contains_key("amount"));
    assert!(!info.truncated);
}

#[tokio::test]
async fn fallthrough_traces_every_condition_it_touched() {
    let ev = evaluator(DebugConfig::capture_all());
    let ruleset = card_auth_ruleset("global", 1);

    let d = ev.evaluate_auth(&tx("tx-2", 50_00, "US"), &ruleset, false).await;

    let info = d.debug_info.unwrap();
    // high-amount (false), hr-country (false), default (true).
    assert_eq!(info.condition_evaluations.len(), 3);
    assert!(info.condition_evaluations.iter().any(|c| c.rule_id == "default" && c.result));
}

#[tokio::test]
async fn disabled_capture_attaches_nothing() {
    let ev = evaluator(DebugConfig::default());
    let ruleset = card_auth_ruleset("global", 1);

    let d = ev.evaluate_auth(&tx("tx-3", 150_00, "US"), &ruleset, false).await;
    assert!(d.debug_info.is_none());
}

#[tokio::test]
async fn cap_truncates_silently() {
    let debug = DebugConfig {
        enabled: true,
        sample_rate: 1,
        max_condition_evaluations: 2,
        include_field_values: false,
    };
    let ev = evaluator(debug);
    let ruleset = card_auth_ruleset("global", 1);

    let d = ev.evaluate_auth(&tx("tx-4", 50_00, "US"), &ruleset, false).await;

    let info = d.debug_info.unwrap();
    assert_eq!(info.condition_evaluations.len(), 2);
    assert!(info.truncated);
    // Truncation is debug-only: the decision itself is unaffected.
    assert_eq!(d.matched_rules[0].rule_id, "default");
}
