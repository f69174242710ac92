//! In-memory ruleset source: versions are registered up front and handed
//! out by (country, key, version), like an artifact store would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use cge_registry::{RulesetSource, SourceError};
use cge_schemas::Ruleset;

#[derive(Default)]
pub struct MemoryRulesetSource {
    rulesets: Mutex<HashMap<(String, String, u32), Ruleset>>,
    fail_loads: AtomicBool,
}

impl MemoryRulesetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a version, keyed by the ruleset's own (country, key, version).
    pub fn add(&self, ruleset: Ruleset) {
        let slot = (
            ruleset.country.clone(),
            ruleset.key.clone(),
            ruleset.version,
        );
        self.rulesets.lock().unwrap().insert(slot, ruleset);
    }

    /// Make every load fail (LOAD_FAILED path).
    pub fn set_fail_loads(&self, fail: bool) {
        self.fail_loads.store(fail, Ordering::Relaxed);
    }
}

#[async_trait]
impl RulesetSource for MemoryRulesetSource {
    async fn load(&self, country: &str, key: &str, version: u32) -> Result<Ruleset, SourceError> {
        if self.fail_loads.load(Ordering::Relaxed) {
            return Err(SourceError::Failed(
                "memory source marked failing".to_string(),
            ));
        }
        self.rulesets
            .lock()
            .unwrap()
            .get(&(country.to_string(), key.to_string(), version))
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                country: country.to_string(),
                key: key.to_string(),
                version,
            })
    }
}
