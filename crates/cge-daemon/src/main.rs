//! cge-daemon entry point.
//!
//! This file is intentionally thin: it sets up tracing, loads config, wires
//! the Redis-backed subsystems and background workers, and starts the HTTP
//! server. All route handlers live in `routes.rs`; shared state in
//! `state.rs`.

use std::{net::SocketAddr, path::Path, sync::Arc};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use cge_daemon::{routes, state};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use cge_config::EngineSettings;
use cge_engine::{DebugConfig, Evaluator};
use cge_outbox::{
    DispatcherConfig, OutboxDispatcher, OutboxHealth, OutboxMetrics, OutboxQueue, PublisherConfig,
    PublisherWorker, RedisDecisionStream, RedisStreamBus,
};
use cge_registry::{FsRulesetSource, RulesetRegistry};
use cge_velocity::{RedisVelocityStore, VelocityService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env.local if present (dev convenience). Silent if the file does
    // not exist — production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let settings = load_settings()?;

    let client = redis::Client::open(settings.redis.url.as_str())
        .with_context(|| format!("invalid redis url {}", settings.redis.url))?;
    let conn = redis::aio::ConnectionManager::new(client)
        .await
        .context("connect to redis")?;

    let velocity = VelocityService::new(Arc::new(RedisVelocityStore::new(conn.clone())));
    let evaluator = Evaluator::new(
        velocity,
        DebugConfig {
            enabled: settings.evaluation.debug.enabled,
            sample_rate: settings.evaluation.debug.sample_rate,
            max_condition_evaluations: settings.evaluation.debug.max_condition_evaluations,
            include_field_values: settings.evaluation.debug.include_field_values,
        },
    );

    let registry = Arc::new(RulesetRegistry::new(Arc::new(FsRulesetSource::new(
        &settings.rulesets.dir,
    ))));

    let stream = Arc::new(RedisDecisionStream::new(
        conn.clone(),
        &settings.outbox.stream_key,
        &settings.outbox.consumer_group,
        format!("publisher-{}", std::process::id()),
    ));
    // Booting without Redis is allowed — the engine fails open and the
    // dispatcher flips the 503 gate until the stream comes back.
    if let Err(e) = stream.ensure_group().await {
        warn!(error = %e, "could not ensure outbox consumer group at boot");
    }
    let bus = Arc::new(RedisStreamBus::new(conn, &settings.bus.topic));

    let queue = Arc::new(OutboxQueue::new(settings.outbox.queue_capacity));
    let outbox_health = Arc::new(OutboxHealth::new());
    let outbox_metrics = Arc::new(OutboxMetrics::default());

    tokio::spawn(
        OutboxDispatcher::new(
            Arc::clone(&queue),
            stream.clone(),
            Arc::clone(&outbox_health),
            Arc::clone(&outbox_metrics),
            DispatcherConfig {
                append_max_retries: settings.outbox.append_max_retries,
                append_backoff_ms: settings.outbox.append_backoff_ms,
            },
        )
        .run(),
    );
    tokio::spawn(
        PublisherWorker::new(
            stream,
            bus.clone(),
            Arc::clone(&outbox_metrics),
            PublisherConfig {
                poll_interval_ms: settings.outbox.poll_interval_ms,
                read_batch_count: settings.outbox.read_batch_count,
                pending_min_idle_ms: settings.outbox.pending_min_idle_ms,
                pending_claim_count: settings.outbox.pending_claim_count,
                pending_summary_interval_ms: settings.outbox.pending_summary_interval_ms,
            },
        )
        .run(),
    );

    let shared = Arc::new(state::AppState::new(
        registry,
        evaluator,
        queue,
        bus,
        outbox_health,
        outbox_metrics,
    ));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env()
        .or_else(|| settings.server.bind_addr.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8787)));
    info!("cge-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// Layered config: `config/default.yaml` then the optional `CGE_CONFIG`
/// override path. Both are optional; an empty stack boots pure defaults.
fn load_settings() -> anyhow::Result<EngineSettings> {
    let mut paths: Vec<String> = Vec::new();
    if Path::new("config/default.yaml").exists() {
        paths.push("config/default.yaml".to_string());
    }
    if let Ok(p) = std::env::var("CGE_CONFIG") {
        paths.push(p);
    }

    if paths.is_empty() {
        info!("no config files found; using built-in defaults");
        return Ok(EngineSettings::default());
    }

    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let cfg = cge_config::load(&refs)?;
    info!(config_fingerprint = %cfg.fingerprint, files = ?paths, "config loaded");
    Ok(cfg.settings)
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("CGE_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    // Best-effort: in-flight requests finish; enqueued decisions that have
    // not reached the stream die with the process, exactly like a crash —
    // the at-least-once contract starts at the stream append.
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

/// CORS: allow only localhost origins (management UI / local tooling).
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
