//! Concurrent readers during a hot-swap observe either the old ruleset or
//! the new one, never a hybrid of version and rule content.

use std::sync::Arc;

use cge_registry::{HotSwapStatus, RulesetRegistry, RulesetSource};
use cge_schemas::{Condition, ConditionOperator, DecisionAction, EvaluationType, Rule, Ruleset};
use cge_testkit::MemoryRulesetSource;
use serde_json::json;

/// v1 declines over-100 amounts; v2 has the same rule id and condition but
/// approves. Any (version, action) pairing other than (1, DECLINE) or
/// (2, APPROVE) is a torn read.
fn amount_gate(version: u32, action: DecisionAction) -> Ruleset {
    let mut r = Rule {
        id: "amount-gate".to_string(),
        name: "amount-gate".to_string(),
        priority: 100,
        enabled: true,
        action,
        conditions: Vec::new(),
        velocity: None,
        predicate: None,
    };
    r.conditions = vec![Condition::new("amount", ConditionOperator::Gt, json!(100))];

    Ruleset {
        key: "CARD_AUTH".to_string(),
        version,
        country: "global".to_string(),
        evaluation_type: EvaluationType::Auth,
        rules: vec![r],
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_observe_a_hybrid_ruleset() {
    let source = Arc::new(MemoryRulesetSource::new());
    source.add(amount_gate(1, DecisionAction::Decline));
    source.add(amount_gate(2, DecisionAction::Approve));

    let registry = Arc::new(RulesetRegistry::new(
        Arc::clone(&source) as Arc<dyn RulesetSource>
    ));
    assert!(registry.load_and_register("global", "CARD_AUTH", 1).await);

    const READERS: usize = 8;
    const READS_PER_TASK: usize = 1_250; // 10_000 snapshots total

    let mut tasks = Vec::new();
    for _ in 0..READERS {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move {
            let mut observed = Vec::with_capacity(READS_PER_TASK);
            for i in 0..READS_PER_TASK {
                let rs = registry.get("global", "CARD_AUTH").expect("slot present");
                observed.push((rs.version, rs.rules[0].action));
                if i % 64 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            observed
        }));
    }

    // Swap mid-flight.
    tokio::task::yield_now().await;
    let swap = registry.hot_swap("global", "CARD_AUTH", 2).await;
    assert_eq!(swap.status, HotSwapStatus::Replaced);

    let mut saw_v1 = false;
    let mut saw_v2 = false;
    for task in tasks {
        for (version, action) in task.await.unwrap() {
            match (version, action) {
                (1, DecisionAction::Decline) => saw_v1 = true,
                (2, DecisionAction::Approve) => saw_v2 = true,
                other => panic!("torn snapshot observed: {other:?}"),
            }
        }
    }
    // Readers finishing entirely before or after the swap are legal; what
    // matters is that every snapshot was one of the two whole rulesets.
    assert!(saw_v1 || saw_v2);
    assert_eq!(registry.get("global", "CARD_AUTH").unwrap().version, 2);
}
