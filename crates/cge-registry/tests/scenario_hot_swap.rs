//! Registry lifecycle: load, bulk-load, fallback, and hot-swap status
//! semantics (REPLACED / STALE / NOT_FOUND / LOAD_FAILED).

use std::sync::Arc;

use cge_registry::{BulkLoadEntry, HotSwapStatus, RulesetRegistry};
use cge_testkit::{card_auth_ruleset, MemoryRulesetSource};

fn registry_with_source() -> (Arc<RulesetRegistry>, Arc<MemoryRulesetSource>) {
    let source = Arc::new(MemoryRulesetSource::new());
    let registry = Arc::new(RulesetRegistry::new(
        Arc::clone(&source) as Arc<dyn cge_registry::RulesetSource>
    ));
    (registry, source)
}

#[tokio::test]
async fn bulk_load_then_get_round_trips() {
    let (registry, source) = registry_with_source();
    source.add(card_auth_ruleset("US", 1));
    source.add(card_auth_ruleset("global", 1));

    let loaded = registry
        .bulk_load(&[
            BulkLoadEntry {
                country: "US".to_string(),
                ruleset_key: "CARD_AUTH".to_string(),
                version: 1,
            },
            BulkLoadEntry {
                country: "global".to_string(),
                ruleset_key: "CARD_AUTH".to_string(),
                version: 1,
            },
            // Unknown entry loads nothing but does not fail the batch.
            BulkLoadEntry {
                country: "FR".to_string(),
                ruleset_key: "CARD_AUTH".to_string(),
                version: 9,
            },
        ])
        .await;

    assert_eq!(loaded, 2);
    let rs = registry.get("US", "CARD_AUTH").unwrap();
    assert_eq!(rs.version, 1);
    assert_eq!(rs.country, "US");

    // Idempotent: re-loading the same entries changes nothing.
    let again = registry
        .bulk_load(&[BulkLoadEntry {
            country: "US".to_string(),
            ruleset_key: "CARD_AUTH".to_string(),
            version: 1,
        }])
        .await;
    assert_eq!(again, 1);
    assert_eq!(registry.get("US", "CARD_AUTH").unwrap().version, 1);
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn fallback_prefers_country_then_global() {
    let (registry, _source) = registry_with_source();
    registry.install(card_auth_ruleset("US", 3));
    registry.install(card_auth_ruleset("global", 1));

    assert_eq!(
        registry.get_with_fallback(Some("US"), "CARD_AUTH").unwrap().version,
        3
    );
    // Lowercase input normalizes at the boundary.
    assert_eq!(
        registry.get_with_fallback(Some("us"), "CARD_AUTH").unwrap().version,
        3
    );
    // Unknown country falls back to global.
    assert_eq!(
        registry.get_with_fallback(Some("FR"), "CARD_AUTH").unwrap().version,
        1
    );
    // No country consults only global.
    assert_eq!(
        registry.get_with_fallback(None, "CARD_AUTH").unwrap().version,
        1
    );
    assert!(registry.get_with_fallback(Some("FR"), "NO_SUCH_KEY").is_none());
}

#[tokio::test]
async fn hot_swap_replaces_then_rejects_stale_versions() {
    let (registry, source) = registry_with_source();
    source.add(card_auth_ruleset("global", 1));
    source.add(card_auth_ruleset("global", 2));
    assert!(registry.load_and_register("global", "CARD_AUTH", 1).await);

    let swapped = registry.hot_swap("global", "CARD_AUTH", 2).await;
    assert!(swapped.success);
    assert_eq!(swapped.status, HotSwapStatus::Replaced);
    assert_eq!(swapped.old_version, Some(1));
    assert_eq!(registry.get("global", "CARD_AUTH").unwrap().version, 2);

    // Same version again: idempotent STALE, state unchanged.
    let repeat = registry.hot_swap("global", "CARD_AUTH", 2).await;
    assert!(!repeat.success);
    assert_eq!(repeat.status, HotSwapStatus::Stale);
    assert_eq!(registry.get("global", "CARD_AUTH").unwrap().version, 2);

    // Downgrade: also STALE.
    let downgrade = registry.hot_swap("global", "CARD_AUTH", 1).await;
    assert_eq!(downgrade.status, HotSwapStatus::Stale);
    assert_eq!(downgrade.old_version, Some(2));
}

#[tokio::test]
async fn hot_swap_misses_report_not_found() {
    let (registry, source) = registry_with_source();
    source.add(card_auth_ruleset("global", 1));

    // No slot registered at all.
    let no_slot = registry.hot_swap("global", "CARD_AUTH", 2).await;
    assert_eq!(no_slot.status, HotSwapStatus::NotFound);

    registry.load_and_register("global", "CARD_AUTH", 1).await;

    // Slot exists but the source has no v5.
    let no_version = registry.hot_swap("global", "CARD_AUTH", 5).await;
    assert_eq!(no_version.status, HotSwapStatus::NotFound);
    assert_eq!(registry.get("global", "CARD_AUTH").unwrap().version, 1);
}

#[tokio::test]
async fn hot_swap_surfaces_loader_failures_without_touching_state() {
    let (registry, source) = registry_with_source();
    source.add(card_auth_ruleset("global", 1));
    registry.load_and_register("global", "CARD_AUTH", 1).await;

    source.set_fail_loads(true);
    let failed = registry.hot_swap("global", "CARD_AUTH", 2).await;
    assert_eq!(failed.status, HotSwapStatus::LoadFailed);
    assert_eq!(failed.old_version, Some(1));
    assert_eq!(registry.get("global", "CARD_AUTH").unwrap().version, 1);
}

#[tokio::test]
async fn install_normalizes_country_casing() {
    let (registry, _source) = registry_with_source();
    registry.install(card_auth_ruleset("us", 1));

    assert!(registry.get("US", "CARD_AUTH").is_some());
    assert!(registry.get("us", "CARD_AUTH").is_some());
}
