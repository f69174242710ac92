//! cge-registry
//!
//! Versioned in-memory ruleset store keyed by (country, ruleset-key).
//!
//! Readers are lock-free: each slot is an `ArcSwap<Ruleset>` cell inside a
//! concurrent map, and `get` takes a snapshot of the cell with a single
//! atomic pointer load. Writers publish a whole new `Ruleset` into the cell,
//! so a concurrent reader observes either the old version or the new one,
//! never a hybrid. Writers are serialized; readers never wait.
//!
//! The registry is process-local. Cross-replica propagation is somebody
//! else's job.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use cge_schemas::Ruleset;

mod source;

pub use source::{FsRulesetSource, RulesetSource, SourceError};

/// Literal country for rulesets that apply everywhere. Stored lowercase;
/// real country codes are uppercased at this boundary.
pub const GLOBAL_COUNTRY: &str = "global";

/// Uppercase a country code; `"global"` (any casing) maps to the literal.
/// `None` stays `None` — lookups with no country consult only global.
pub fn normalize_country(raw: Option<&str>) -> Option<String> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.eq_ignore_ascii_case(GLOBAL_COUNTRY) {
        Some(GLOBAL_COUNTRY.to_string())
    } else {
        Some(raw.to_ascii_uppercase())
    }
}

// ---------------------------------------------------------------------------
// Hot-swap result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HotSwapStatus {
    Replaced,
    NotFound,
    Stale,
    LoadFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotSwapResult {
    pub success: bool,
    pub status: HotSwapStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_version: Option<u32>,
    pub message: String,
}

impl HotSwapResult {
    fn replaced(old_version: u32, new_version: u32) -> Self {
        Self {
            success: true,
            status: HotSwapStatus::Replaced,
            old_version: Some(old_version),
            message: format!("replaced v{old_version} with v{new_version}"),
        }
    }

    fn stale(current: u32, requested: u32) -> Self {
        Self {
            success: false,
            status: HotSwapStatus::Stale,
            old_version: Some(current),
            message: format!("requested v{requested} is not newer than current v{current}"),
        }
    }

    fn not_found(message: String) -> Self {
        Self {
            success: false,
            status: HotSwapStatus::NotFound,
            old_version: None,
            message,
        }
    }

    fn load_failed(old_version: Option<u32>, message: String) -> Self {
        Self {
            success: false,
            status: HotSwapStatus::LoadFailed,
            old_version,
            message,
        }
    }
}

/// One entry of a bulk load request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkLoadEntry {
    pub country: String,
    pub ruleset_key: String,
    pub version: u32,
}

// ---------------------------------------------------------------------------
// RulesetRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SlotKey {
    country: String,
    key: String,
}

/// Registry handle. Owned by the top-level engine wiring and injected into
/// the evaluator and the management endpoints; tests build their own.
pub struct RulesetRegistry {
    slots: DashMap<SlotKey, Arc<ArcSwap<Ruleset>>>,
    source: Arc<dyn RulesetSource>,
    /// Serializes load/swap writers. Readers never touch this.
    write_lock: Mutex<()>,
}

impl RulesetRegistry {
    pub fn new(source: Arc<dyn RulesetSource>) -> Self {
        Self {
            slots: DashMap::new(),
            source,
            write_lock: Mutex::new(()),
        }
    }

    /// Number of registered (country, key) slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Exact-match lookup. The returned snapshot stays valid for the whole
    /// request even if a swap lands mid-flight.
    pub fn get(&self, country: &str, key: &str) -> Option<Arc<Ruleset>> {
        let Some(country) = normalize_country(Some(country)) else {
            return None;
        };
        let slot = SlotKey {
            country,
            key: key.to_string(),
        };
        self.slots.get(&slot).map(|cell| cell.load_full())
    }

    /// `(country, key)` first, then `("global", key)`. A request with no
    /// country goes straight to global.
    pub fn get_with_fallback(&self, country: Option<&str>, key: &str) -> Option<Arc<Ruleset>> {
        if let Some(c) = normalize_country(country) {
            if let Some(rs) = self.get(&c, key) {
                return Some(rs);
            }
        }
        self.get(GLOBAL_COUNTRY, key)
    }

    /// Install a ruleset directly, bypassing the source. Rules are put in
    /// evaluation order here so the hot path never sorts.
    pub fn install(&self, ruleset: Ruleset) {
        let ruleset = ruleset.with_evaluation_order();
        let slot = SlotKey {
            country: normalize_country(Some(&ruleset.country))
                .unwrap_or_else(|| GLOBAL_COUNTRY.to_string()),
            key: ruleset.key.clone(),
        };
        let version = ruleset.version;
        match self.slots.entry(slot) {
            dashmap::mapref::entry::Entry::Occupied(e) => {
                e.get().store(Arc::new(ruleset));
            }
            dashmap::mapref::entry::Entry::Vacant(e) => {
                e.insert(Arc::new(ArcSwap::from_pointee(ruleset)));
            }
        }
        info!(version, "ruleset installed");
    }

    /// First registration path: load through the source and install without
    /// a monotonicity check. Returns false when the source cannot provide
    /// the requested version.
    pub async fn load_and_register(&self, country: &str, key: &str, version: u32) -> bool {
        let _w = self.write_lock.lock().await;
        let country = match normalize_country(Some(country)) {
            Some(c) => c,
            None => {
                warn!(key, version, "load_and_register called with empty country");
                return false;
            }
        };
        match self.source.load(&country, key, version).await {
            Ok(ruleset) => {
                self.install(ruleset);
                true
            }
            Err(e) => {
                warn!(country = %country, key, version, error = %e, "load_and_register failed");
                false
            }
        }
    }

    /// Idempotent bulk registration; each entry follows `load_and_register`
    /// semantics. Returns how many entries installed successfully.
    pub async fn bulk_load(&self, entries: &[BulkLoadEntry]) -> usize {
        let mut loaded = 0;
        for entry in entries {
            if self
                .load_and_register(&entry.country, &entry.ruleset_key, entry.version)
                .await
            {
                loaded += 1;
            }
        }
        loaded
    }

    /// Atomic version replacement.
    ///
    /// Monotonicity is enforced before and after the (awaited) source load:
    /// the pre-check rejects obviously stale requests without touching the
    /// source, and the post-load re-check closes the race where a newer
    /// version landed while this load was in flight. On any non-REPLACED
    /// outcome the registry is untouched.
    pub async fn hot_swap(&self, country: &str, key: &str, new_version: u32) -> HotSwapResult {
        let _w = self.write_lock.lock().await;

        let Some(norm_country) = normalize_country(Some(country)) else {
            return HotSwapResult::not_found("country must be non-empty".to_string());
        };
        let slot = SlotKey {
            country: norm_country.clone(),
            key: key.to_string(),
        };
        let Some(cell) = self.slots.get(&slot).map(|c| Arc::clone(&c)) else {
            return HotSwapResult::not_found(format!(
                "no ruleset registered for ({norm_country}, {key}); use load first"
            ));
        };

        // Snapshot the version only; a load guard must not live across the
        // source await below.
        let old_version = cell.load().version;
        if new_version <= old_version {
            return HotSwapResult::stale(old_version, new_version);
        }

        let loaded = match self.source.load(&norm_country, key, new_version).await {
            Ok(rs) => rs.with_evaluation_order(),
            Err(SourceError::NotFound { .. }) => {
                return HotSwapResult::not_found(format!(
                    "version v{new_version} not found for ({norm_country}, {key})"
                ));
            }
            Err(SourceError::Failed(msg)) => {
                warn!(country = %norm_country, key, new_version, error = %msg, "hot_swap load failed");
                return HotSwapResult::load_failed(Some(old_version), msg);
            }
        };

        let latest_version = cell.load().version;
        if new_version <= latest_version {
            return HotSwapResult::stale(latest_version, new_version);
        }

        cell.store(Arc::new(loaded));
        info!(country = %norm_country, key, old_version, new_version, "ruleset hot-swapped");
        HotSwapResult::replaced(old_version, new_version)
    }
}
