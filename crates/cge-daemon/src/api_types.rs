//! Request / response bodies for the HTTP surface. The full `Decision`
//! envelope lives in cge-schemas; this module is only the shapes that exist
//! purely at the boundary.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cge_outbox::OutboxMetricsSnapshot;
use cge_registry::BulkLoadEntry;
use cge_schemas::{Decision, DecisionAction, EngineErrorCode, EngineMode};

// ---------------------------------------------------------------------------
// Evaluate
// ---------------------------------------------------------------------------

/// Compact AUTH response. The full envelope is durable in the outbox; the
/// synchronous caller only needs the verdict and its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub decision: DecisionAction,
    pub engine_mode: EngineMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_error_code: Option<EngineErrorCode>,
    pub ruleset_key: String,
    pub ruleset_version: u32,
    pub decision_id: Uuid,
    pub processing_time_ms: f64,
}

impl AuthResponse {
    pub fn from_decision(d: &Decision, processing_time_ms: f64) -> Self {
        Self {
            decision: d.decision,
            engine_mode: d.engine_mode,
            engine_error_code: d.engine_error_code,
            ruleset_key: d.ruleset_key.clone(),
            ruleset_version: d.ruleset_version,
            decision_id: d.decision_id,
            processing_time_ms,
        }
    }
}

/// 400-level validation failure from the boundary layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Ruleset management
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRequest {
    pub country: String,
    pub ruleset_key: String,
    pub version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadResponse {
    pub loaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkLoadRequest {
    pub entries: Vec<BulkLoadEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkLoadResponse {
    pub count_loaded: usize,
}

// ---------------------------------------------------------------------------
// Health / status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub rulesets_registered: usize,
    pub outbox_healthy: bool,
    pub queue_depth: usize,
    pub queue_dropped: u64,
    pub outbox: OutboxMetricsSnapshot,
}
