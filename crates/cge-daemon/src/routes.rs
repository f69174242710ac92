//! Axum router and all HTTP handlers for cge-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. All handlers are `pub(crate)` so the scenario tests in
//! `tests/` can compose the router directly.
//!
//! Error policy at this boundary: rule/velocity faults never become HTTP
//! errors (they ride the decision envelope); malformed bodies are 400; the
//! only 5xx this service produces on the evaluate paths is 503 when the
//! outbox cannot durably accept AUTH decisions.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::info;

use cge_registry::HotSwapStatus;
use cge_schemas::{
    Decision, DecisionAction, EngineErrorCode, EvaluationType, Transaction, AUTH_RULESET_KEY,
    MONITORING_RULESET_KEY,
};

use crate::{
    api_types::{
        AuthResponse, BulkLoadRequest, BulkLoadResponse, HealthResponse, LoadRequest, LoadResponse,
        StatusResponse, ValidationErrorResponse,
    },
    state::{uptime_secs, AppState},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/evaluate/auth", post(evaluate_auth))
        .route("/v1/evaluate/monitoring", post(evaluate_monitoring))
        .route("/v1/rulesets/load", post(rulesets_load))
        .route("/v1/rulesets/bulk-load", post(rulesets_bulk_load))
        .route("/v1/rulesets/hotswap", post(rulesets_hotswap))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// POST /v1/evaluate/auth
// ---------------------------------------------------------------------------

pub(crate) async fn evaluate_auth(
    State(st): State<Arc<AppState>>,
    Json(tx): Json<Transaction>,
) -> Response {
    let started = Instant::now();

    // Durability gate: when the outbox cannot accept decisions the engine
    // fails open and the boundary reports 503. The decision still enters
    // the queue so it drains once the stream recovers.
    if !st.outbox_health.is_healthy() {
        let decision = Decision::fail_open(
            EvaluationType::Auth,
            AUTH_RULESET_KEY,
            &tx.transaction_id,
            EngineErrorCode::OutboxUnavailable,
            "outbox append failing; durability cannot be met",
        );
        let body = AuthResponse::from_decision(&decision, elapsed_ms(started));
        st.enqueue_auth(tx, decision);
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    }

    let Some(ruleset) = st
        .registry
        .get_with_fallback(tx.country_code.as_deref(), AUTH_RULESET_KEY)
    else {
        let decision = Decision::fail_open(
            EvaluationType::Auth,
            AUTH_RULESET_KEY,
            &tx.transaction_id,
            EngineErrorCode::RulesetNotLoaded,
            format!(
                "no {AUTH_RULESET_KEY} ruleset for country {:?} or global",
                tx.country_code
            ),
        );
        let body = AuthResponse::from_decision(&decision, elapsed_ms(started));
        st.enqueue_auth(tx, decision);
        return (StatusCode::OK, Json(body)).into_response();
    };

    let decision = st.evaluator.evaluate_auth(&tx, &ruleset, false).await;
    let body = AuthResponse::from_decision(&decision, elapsed_ms(started));
    st.enqueue_auth(tx, decision);

    (StatusCode::OK, Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// POST /v1/evaluate/monitoring
// ---------------------------------------------------------------------------

pub(crate) async fn evaluate_monitoring(
    State(st): State<Arc<AppState>>,
    Json(tx): Json<Transaction>,
) -> Response {
    // Boundary validation: the upstream decision is required and must
    // normalize to APPROVE or DECLINE. Everything else is the caller's bug.
    match &tx.decision {
        None => {
            return validation_error("decision is required for monitoring evaluation");
        }
        Some(raw) => match DecisionAction::parse_normalized(raw) {
            Some(DecisionAction::Approve) | Some(DecisionAction::Decline) => {}
            _ => {
                return validation_error("decision must be APPROVE or DECLINE");
            }
        },
    }

    let Some(ruleset) = st
        .registry
        .get_with_fallback(tx.country_code.as_deref(), MONITORING_RULESET_KEY)
    else {
        let decision = Decision::fail_open(
            EvaluationType::Monitoring,
            MONITORING_RULESET_KEY,
            &tx.transaction_id,
            EngineErrorCode::RulesetNotLoaded,
            format!(
                "no {MONITORING_RULESET_KEY} ruleset for country {:?} or global",
                tx.country_code
            ),
        );
        return (StatusCode::OK, Json(decision)).into_response();
    };

    let mut decision = st.evaluator.evaluate_monitoring(&tx, &ruleset, false).await;

    // Monitoring decisions skip the outbox: publish straight to the bus,
    // ack-awaited, and degrade the envelope if the bus refuses.
    let event = cge_schemas::DecisionEvent {
        decision: decision.clone(),
        transaction: tx.clone(),
        enqueued_at_ms: chrono::Utc::now().timestamp_millis(),
    };
    if let Err(e) = st.bus.publish(&tx.transaction_id, &event).await {
        tracing::warn!(
            transaction_id = %tx.transaction_id,
            error = %e,
            "monitoring publish failed"
        );
        if decision.engine_mode == cge_schemas::EngineMode::Normal {
            decision.engine_mode = cge_schemas::EngineMode::Degraded;
        }
        if decision.engine_error_code.is_none() {
            decision.engine_error_code = Some(EngineErrorCode::EventPublishFailed);
            decision.engine_error_message = Some(e.to_string());
        }
    }

    (StatusCode::OK, Json(decision)).into_response()
}

fn validation_error(message: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ValidationErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

// ---------------------------------------------------------------------------
// POST /v1/rulesets/load
// ---------------------------------------------------------------------------

pub(crate) async fn rulesets_load(
    State(st): State<Arc<AppState>>,
    Json(req): Json<LoadRequest>,
) -> impl IntoResponse {
    let loaded = st
        .registry
        .load_and_register(&req.country, &req.ruleset_key, req.version)
        .await;
    info!(
        country = %req.country,
        ruleset_key = %req.ruleset_key,
        version = req.version,
        loaded,
        "rulesets/load"
    );
    (StatusCode::OK, Json(LoadResponse { loaded }))
}

// ---------------------------------------------------------------------------
// POST /v1/rulesets/bulk-load
// ---------------------------------------------------------------------------

pub(crate) async fn rulesets_bulk_load(
    State(st): State<Arc<AppState>>,
    Json(req): Json<BulkLoadRequest>,
) -> impl IntoResponse {
    let count_loaded = st.registry.bulk_load(&req.entries).await;
    info!(
        requested = req.entries.len(),
        count_loaded, "rulesets/bulk-load"
    );
    (StatusCode::OK, Json(BulkLoadResponse { count_loaded }))
}

// ---------------------------------------------------------------------------
// POST /v1/rulesets/hotswap
// ---------------------------------------------------------------------------

pub(crate) async fn rulesets_hotswap(
    State(st): State<Arc<AppState>>,
    Json(req): Json<LoadRequest>,
) -> Response {
    let result = st
        .registry
        .hot_swap(&req.country, &req.ruleset_key, req.version)
        .await;
    info!(
        country = %req.country,
        ruleset_key = %req.ruleset_key,
        version = req.version,
        status = ?result.status,
        "rulesets/hotswap"
    );

    let code = match result.status {
        HotSwapStatus::Replaced => StatusCode::OK,
        HotSwapStatus::Stale => StatusCode::CONFLICT,
        HotSwapStatus::NotFound => StatusCode::NOT_FOUND,
        HotSwapStatus::LoadFailed => StatusCode::BAD_GATEWAY,
    };
    (code, Json(result)).into_response()
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(StatusResponse {
            service: st.build.service,
            version: st.build.version,
            uptime_secs: uptime_secs(),
            rulesets_registered: st.registry.len(),
            outbox_healthy: st.outbox_health.is_healthy(),
            queue_depth: st.queue.len(),
            queue_dropped: st.queue.dropped_total(),
            outbox: st.outbox_metrics.snapshot(),
        }),
    )
}
