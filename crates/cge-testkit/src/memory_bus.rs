//! In-memory event bus capturing (key, event) publishes, with a failure
//! toggle to exercise the publish-retry / reclaim path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use cge_outbox::{BusError, DecisionBus};
use cge_schemas::DecisionEvent;

#[derive(Default)]
pub struct MemoryBus {
    published: Mutex<Vec<(String, DecisionEvent)>>,
    fail_publishes: AtomicBool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_publishes(&self, fail: bool) {
        self.fail_publishes.store(fail, Ordering::Relaxed);
    }

    /// Everything published so far, in publish order.
    pub fn published(&self) -> Vec<(String, DecisionEvent)> {
        self.published.lock().unwrap().clone()
    }

    pub fn published_count(&self) -> usize {
        self.published.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionBus for MemoryBus {
    async fn publish(&self, key: &str, event: &DecisionEvent) -> Result<(), BusError> {
        if self.fail_publishes.load(Ordering::Relaxed) {
            return Err(BusError::PublishFailed(
                "memory bus marked failing".to_string(),
            ));
        }
        self.published
            .lock()
            .unwrap()
            .push((key.to_string(), event.clone()));
        Ok(())
    }
}
