//! In-memory velocity counter store with TTL semantics and a failure toggle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use cge_velocity::{VelocityError, VelocityStore};

#[derive(Default)]
pub struct MemoryVelocityStore {
    counters: Mutex<HashMap<String, (u64, Instant)>>,
    unavailable: AtomicBool,
}

impl MemoryVelocityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backing store being unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    fn check_available(&self) -> Result<(), VelocityError> {
        if self.unavailable.load(Ordering::Relaxed) {
            Err(VelocityError::Unavailable(
                "memory store marked unavailable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl VelocityStore for MemoryVelocityStore {
    async fn incr_with_ttl(&self, key: &str, ttl_seconds: u64) -> Result<u64, VelocityError> {
        self.check_available()?;
        let mut counters = self.counters.lock().unwrap();
        let now = Instant::now();
        let slot = counters
            .entry(key.to_string())
            .and_modify(|(count, expires_at)| {
                if *expires_at <= now {
                    *count = 0;
                    *expires_at = now + Duration::from_secs(ttl_seconds);
                }
            })
            .or_insert((0, now + Duration::from_secs(ttl_seconds)));
        slot.0 += 1;
        Ok(slot.0)
    }

    async fn read_count(&self, key: &str) -> Result<u64, VelocityError> {
        self.check_available()?;
        let counters = self.counters.lock().unwrap();
        let now = Instant::now();
        Ok(counters
            .get(key)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(count, _)| *count)
            .unwrap_or(0))
    }
}
