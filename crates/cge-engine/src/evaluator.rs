//! AUTH (first-match) and MONITORING (all-match) evaluation.
//!
//! Rule and velocity faults never escape to the caller as errors: they are
//! recorded on the decision (`engine_mode`, `engine_error_code`) and the
//! algorithm continues or fails open. The only `Result` in this module is
//! internal — faults are translated to decision state at the top of each
//! entry point.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use cge_schemas::{
    Decision, DecisionAction, EngineErrorCode, EngineMode, EvaluationType, MatchedRule, Rule,
    Ruleset, TimingBreakdown, Transaction, VelocityResult,
};
use cge_velocity::{VelocityError, VelocityService};

use crate::condition;
use crate::debug::{self, DebugBuilder, DebugConfig};

/// Internal fault raised while running rules. AUTH fails open on it;
/// MONITORING degrades but keeps the caller's decision.
#[derive(Debug, Error)]
pub enum EngineFault {
    #[error("rule evaluation failed: {0}")]
    Evaluation(String),
}

// ---------------------------------------------------------------------------
// EvaluationContext
// ---------------------------------------------------------------------------

/// Accumulator for one evaluation: the inputs, the clock, and everything
/// that ends up on the decision envelope.
struct EvaluationContext<'a> {
    tx: &'a Transaction,
    ruleset: &'a Ruleset,
    replay_mode: bool,
    started: Instant,
    velocity_ms: f64,
    mode: EngineMode,
    error_code: Option<EngineErrorCode>,
    error_message: Option<String>,
    matched: Vec<MatchedRule>,
    velocity_results: BTreeMap<String, VelocityResult>,
    debug: Option<DebugBuilder>,
}

impl<'a> EvaluationContext<'a> {
    fn new(
        tx: &'a Transaction,
        ruleset: &'a Ruleset,
        replay_mode: bool,
        debug: Option<DebugBuilder>,
    ) -> Self {
        Self {
            tx,
            ruleset,
            replay_mode,
            started: Instant::now(),
            velocity_ms: 0.0,
            mode: EngineMode::Normal,
            error_code: None,
            error_message: None,
            matched: Vec::new(),
            velocity_results: BTreeMap::new(),
            debug,
        }
    }

    /// Mark reduced fidelity. The first recorded fault wins; FAIL_OPEN is
    /// never downgraded back to DEGRADED.
    fn degrade(&mut self, code: EngineErrorCode, message: impl Into<String>) {
        if self.mode != EngineMode::FailOpen {
            self.mode = EngineMode::Degraded;
        }
        if self.error_code.is_none() {
            self.error_code = Some(code);
            self.error_message = Some(message.into());
        }
    }

    fn fail_open(&mut self, code: EngineErrorCode, message: impl Into<String>) {
        self.mode = EngineMode::FailOpen;
        self.error_code = Some(code);
        self.error_message = Some(message.into());
    }

    fn into_decision(self, evaluation_type: EvaluationType, decision: DecisionAction) -> Decision {
        // FAIL_OPEN implies APPROVE, whatever was computed upstream.
        let decision = if self.mode == EngineMode::FailOpen {
            DecisionAction::Approve
        } else {
            decision
        };

        let total_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let rules_ms = (total_ms - self.velocity_ms).max(0.0);

        Decision {
            decision,
            evaluation_type,
            ruleset_key: self.ruleset.key.clone(),
            ruleset_version: self.ruleset.version,
            transaction_id: self.tx.transaction_id.clone(),
            decision_id: Uuid::new_v4(),
            engine_mode: self.mode,
            engine_error_code: self.error_code,
            engine_error_message: self.error_message,
            matched_rules: self.matched,
            velocity_results: self.velocity_results,
            timing: TimingBreakdown {
                rules_ms,
                velocity_ms: self.velocity_ms,
                total_ms,
            },
            debug_info: self.debug.map(DebugBuilder::finish),
            transaction_context: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Shared evaluation engine for both paths. Cheap to clone.
#[derive(Clone)]
pub struct Evaluator {
    velocity: VelocityService,
    debug: DebugConfig,
}

impl Evaluator {
    pub fn new(velocity: VelocityService, debug: DebugConfig) -> Self {
        Self { velocity, debug }
    }

    fn debug_builder(&self, tx: &Transaction) -> Option<DebugBuilder> {
        debug::sampled_in(&self.debug, &tx.transaction_id).then(|| DebugBuilder::new(&self.debug))
    }

    /// First-match authorization. Stops at the first matching rule in
    /// priority order; no match approves. Any internal fault fails open.
    pub async fn evaluate_auth(
        &self,
        tx: &Transaction,
        ruleset: &Ruleset,
        replay_mode: bool,
    ) -> Decision {
        let mut ctx = EvaluationContext::new(tx, ruleset, replay_mode, self.debug_builder(tx));

        let action = match self.first_match(&mut ctx).await {
            Ok(Some(action)) => action,
            Ok(None) => DecisionAction::Approve,
            Err(fault) => {
                warn!(
                    transaction_id = %tx.transaction_id,
                    ruleset_key = %ruleset.key,
                    error = %fault,
                    "auth evaluation fault; failing open"
                );
                ctx.fail_open(EngineErrorCode::EvaluationError, fault.to_string());
                DecisionAction::Approve
            }
        };

        ctx.into_decision(EvaluationType::Auth, action)
    }

    /// All-match analytics over a decision already taken upstream. The
    /// response decision always equals the (valid) input decision; rules
    /// and velocity only annotate.
    pub async fn evaluate_monitoring(
        &self,
        tx: &Transaction,
        ruleset: &Ruleset,
        replay_mode: bool,
    ) -> Decision {
        let mut ctx = EvaluationContext::new(tx, ruleset, replay_mode, self.debug_builder(tx));

        let input = match tx.decision.as_deref() {
            None => {
                ctx.degrade(
                    EngineErrorCode::MissingDecision,
                    "monitoring input lacks a decision",
                );
                return ctx.into_decision(EvaluationType::Monitoring, DecisionAction::Approve);
            }
            Some(raw) => match DecisionAction::parse_normalized(raw) {
                Some(DecisionAction::Approve) => DecisionAction::Approve,
                Some(DecisionAction::Decline) => DecisionAction::Decline,
                _ => {
                    ctx.degrade(
                        EngineErrorCode::InvalidDecision,
                        format!("monitoring decision must be APPROVE or DECLINE, got {raw:?}"),
                    );
                    return ctx.into_decision(EvaluationType::Monitoring, DecisionAction::Approve);
                }
            },
        };

        if let Err(fault) = self.all_match(&mut ctx).await {
            warn!(
                transaction_id = %tx.transaction_id,
                ruleset_key = %ruleset.key,
                error = %fault,
                "monitoring evaluation fault; keeping input decision"
            );
            ctx.degrade(EngineErrorCode::EvaluationError, fault.to_string());
        }

        ctx.into_decision(EvaluationType::Monitoring, input)
    }

    async fn first_match(
        &self,
        ctx: &mut EvaluationContext<'_>,
    ) -> Result<Option<DecisionAction>, EngineFault> {
        let ruleset = ctx.ruleset;
        for rule in &ruleset.rules {
            if !rule.enabled {
                continue;
            }
            if !self.rule_matches(rule, ctx)? {
                continue;
            }
            let (action, velocity_exceeded) = self.velocity_action(rule, ctx).await;
            ctx.matched.push(MatchedRule {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                priority: rule.priority,
                action,
                velocity_exceeded,
            });
            return Ok(Some(action));
        }
        Ok(None)
    }

    async fn all_match(&self, ctx: &mut EvaluationContext<'_>) -> Result<(), EngineFault> {
        let ruleset = ctx.ruleset;
        for rule in &ruleset.rules {
            if !rule.enabled {
                continue;
            }
            if !self.rule_matches(rule, ctx)? {
                continue;
            }
            let (action, velocity_exceeded) = self.velocity_action(rule, ctx).await;
            ctx.matched.push(MatchedRule {
                rule_id: rule.id.clone(),
                rule_name: rule.name.clone(),
                priority: rule.priority,
                action,
                velocity_exceeded,
            });
        }
        Ok(())
    }

    /// Conditions short-circuit on the first false. A precompiled predicate
    /// replaces condition evaluation entirely; a panicking predicate is the
    /// one thing that can fault a rule.
    fn rule_matches(
        &self,
        rule: &Rule,
        ctx: &mut EvaluationContext<'_>,
    ) -> Result<bool, EngineFault> {
        if let Some(predicate) = &rule.predicate {
            return catch_unwind(AssertUnwindSafe(|| predicate.matches(ctx.tx))).map_err(|_| {
                EngineFault::Evaluation(format!("precompiled predicate panicked in rule {}", rule.id))
            });
        }

        for cond in &rule.conditions {
            let outcome = condition::evaluate(cond, ctx.tx);
            if let Some(dbg) = ctx.debug.as_mut() {
                dbg.record(&rule.id, cond, &outcome.input, outcome.result);
            }
            if !outcome.result {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Resolve the action a matched rule contributes. Velocity exceedance
    /// replaces the rule action; a velocity fault degrades the decision and
    /// proceeds as if the velocity predicate were absent.
    async fn velocity_action(
        &self,
        rule: &Rule,
        ctx: &mut EvaluationContext<'_>,
    ) -> (DecisionAction, bool) {
        let Some(cfg) = &rule.velocity else {
            return (rule.action, false);
        };

        let started = Instant::now();
        let checked = if ctx.replay_mode {
            self.velocity
                .check_read_only(&ctx.ruleset.key, &rule.id, cfg, ctx.tx)
                .await
        } else {
            self.velocity
                .check(&ctx.ruleset.key, &rule.id, cfg, ctx.tx)
                .await
        };
        ctx.velocity_ms += started.elapsed().as_secs_f64() * 1000.0;

        match checked {
            Ok(Some(result)) => {
                let exceeded = result.exceeded();
                ctx.velocity_results.insert(rule.id.clone(), result);
                if exceeded {
                    (cfg.action, true)
                } else {
                    (rule.action, false)
                }
            }
            // Dimension value absent on this transaction: no counter, no fire.
            Ok(None) => (rule.action, false),
            Err(VelocityError::Unavailable(msg)) => {
                warn!(
                    rule_id = %rule.id,
                    dimension = %cfg.dimension,
                    error = %msg,
                    "velocity store unavailable; continuing without the velocity predicate"
                );
                ctx.degrade(EngineErrorCode::RedisUnavailable, msg);
                (rule.action, false)
            }
        }
    }
}
