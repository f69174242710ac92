//! Counter semantics through the service layer against the in-memory store.

use std::sync::Arc;

use cge_schemas::{DecisionAction, VelocityConfig};
use cge_testkit::{tx, MemoryVelocityStore};
use cge_velocity::{VelocityError, VelocityService, VelocityStore};

fn cfg(threshold: u64) -> VelocityConfig {
    VelocityConfig {
        dimension: "card_hash".to_string(),
        window_seconds: 60,
        threshold,
        action: DecisionAction::Decline,
    }
}

#[tokio::test]
async fn check_increments_and_reports_count_vs_threshold() {
    let service = VelocityService::new(Arc::new(MemoryVelocityStore::new()));
    let c = cfg(2);
    let t = tx("tx-1", 10_00, "US");

    for expected in 1..=3u64 {
        let r = service
            .check("CARD_AUTH", "r1", &c, &t)
            .await
            .unwrap()
            .expect("card_hash present");
        assert_eq!(r.current_count, expected);
        assert_eq!(r.exceeded(), expected > 2);
    }
}

#[tokio::test]
async fn read_only_is_pure_over_unchanged_store_state() {
    let service = VelocityService::new(Arc::new(MemoryVelocityStore::new()));
    let c = cfg(5);
    let t = tx("tx-2", 10_00, "US");

    // Absent counter reads as zero.
    let before = service
        .check_read_only("CARD_AUTH", "r1", &c, &t)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(before.current_count, 0);

    service.check("CARD_AUTH", "r1", &c, &t).await.unwrap();
    service.check("CARD_AUTH", "r1", &c, &t).await.unwrap();

    // K identical reads with no intervening check.
    for _ in 0..5 {
        let r = service
            .check_read_only("CARD_AUTH", "r1", &c, &t)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(r.current_count, 2);
    }
}

#[tokio::test]
async fn distinct_dimension_values_count_independently() {
    let service = VelocityService::new(Arc::new(MemoryVelocityStore::new()));
    let c = cfg(5);

    let a = tx("tx-a", 10_00, "US");
    let b = tx("tx-b", 10_00, "US"); // different card_hash via fixture

    service.check("CARD_AUTH", "r1", &c, &a).await.unwrap();
    service.check("CARD_AUTH", "r1", &c, &a).await.unwrap();
    let rb = service
        .check("CARD_AUTH", "r1", &c, &b)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rb.current_count, 1);
}

#[tokio::test]
async fn unavailable_store_surfaces_velocity_error() {
    let store = Arc::new(MemoryVelocityStore::new());
    store.set_unavailable(true);
    let service = VelocityService::new(Arc::clone(&store) as Arc<dyn VelocityStore>);
    let c = cfg(1);
    let t = tx("tx-3", 10_00, "US");

    let err = service.check("CARD_AUTH", "r1", &c, &t).await.unwrap_err();
    assert!(matches!(err, VelocityError::Unavailable(_)));

    let err = service
        .check_read_only("CARD_AUTH", "r1", &c, &t)
        .await
        .unwrap_err();
    assert!(matches!(err, VelocityError::Unavailable(_)));
}

#[tokio::test]
async fn missing_dimension_value_yields_no_result() {
    let service = VelocityService::new(Arc::new(MemoryVelocityStore::new()));
    let c = cfg(1);
    let mut t = tx("tx-4", 10_00, "US");
    t.card_hash = None;

    assert!(service.check("CARD_AUTH", "r1", &c, &t).await.unwrap().is_none());
}
