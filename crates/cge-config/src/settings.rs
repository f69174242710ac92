//! Typed view over the merged config document. Every field has a default so
//! an empty config boots a working engine against localhost Redis.

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub server: ServerSettings,
    pub redis: RedisSettings,
    pub rulesets: RulesetSettings,
    pub outbox: OutboxSettings,
    pub bus: BusSettings,
    pub evaluation: EvaluationSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub url: String,
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RulesetSettings {
    /// Directory the filesystem ruleset source reads compiled rulesets from:
    /// `{dir}/{country}/{key}/v{version}.json`.
    pub dir: String,
}

impl Default for RulesetSettings {
    fn default() -> Self {
        Self {
            dir: "rulesets".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutboxSettings {
    pub stream_key: String,
    pub consumer_group: String,
    pub queue_capacity: usize,
    pub append_max_retries: u32,
    /// Base backoff for append retries; doubles per attempt, capped at 5s.
    pub append_backoff_ms: u64,
    pub poll_interval_ms: u64,
    pub read_batch_count: usize,
    pub pending_min_idle_ms: u64,
    pub pending_claim_count: usize,
    pub pending_summary_interval_ms: u64,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            stream_key: "cge:decisions:outbox".to_string(),
            consumer_group: "cge-publisher".to_string(),
            queue_capacity: 4096,
            append_max_retries: 5,
            append_backoff_ms: 50,
            poll_interval_ms: 50,
            read_batch_count: 100,
            pending_min_idle_ms: 60_000,
            pending_claim_count: 50,
            pending_summary_interval_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusSettings {
    pub topic: String,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            topic: cge_topic(),
        }
    }
}

// Default mirrors cge_schemas::DECISION_TOPIC; duplicated literal here keeps
// this crate dependency-free of the schemas crate.
fn cge_topic() -> String {
    "fraud.card.decisions.v1".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EvaluationSettings {
    pub debug: DebugSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DebugSettings {
    pub enabled: bool,
    /// "1 in N" sampling; 1 samples every request.
    pub sample_rate: u32,
    pub max_condition_evaluations: usize,
    pub include_field_values: bool,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            sample_rate: 100,
            max_condition_evaluations: 100,
            include_field_values: false,
        }
    }
}
