//! Orchestrator - three-stage routing state machine
//!
//! `Start -> Stage1 -> Stage2 -> Stage3 -> Done`, one direction only:
//! - Stage 1: primary decision source, parse, validate, per-route gate
//! - Stage 2: embedding similarity, validate, uniform semantic floor
//! - Stage 3: fixed chat decision, always succeeds
//!
//! [`StageOrchestrator::route`] is total: stage failures are logged and
//! absorbed, never returned. Outcomes are counted in a [`MetricsRegistry`]:
//! plans per stage, rejections per stage and kind, and Stage-1 latency.

mod session;

use crate::config::RoutingConfig;
use crate::context::ConversationContext;
use crate::decision::{
    parse, validate_decision, DecisionPayload, DecisionRequest, DecisionSource, ExecutionPlan,
    ResponseMode, Route, RoutingDecision, SourceError, StageUsed, ValidationError,
};
use crate::error::{Error, Result};
use crate::gate::ConfidenceGate;
use crate::memory::SharedMemory;
use crate::semantic::SemanticRouter;
use crate::utils::{retry_with_backoff, MetricsRegistry, RetryConfig, RetryError};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Reasoning recorded on the Stage-3 decision
pub const STATIC_FALLBACK_REASONING: &str = "static_fallback";

/// Log target for requests no stage could resolve
pub const UNRESOLVED_TARGET: &str = "dualrag::unresolved";

/// Histogram of Stage-1 wall time, in milliseconds
pub const STAGE1_LATENCY_METRIC: &str = "dualrag_stage1_latency_ms";

/// Counter of plans produced by `stage`
#[must_use]
pub fn plan_metric(stage: StageUsed) -> String {
    format!("dualrag_plans_{stage}_total")
}

/// Counter of `stage` rejections of `kind`
///
/// Stage 1 kinds: `source`, `cancelled`, `invalid`, `below_threshold`,
/// `ungated`. Stage 2 adds `no_router` and `embedding`.
#[must_use]
pub fn rejection_metric(stage: RoutingState, kind: &str) -> String {
    format!("dualrag_{stage}_rejected_{kind}_total")
}

/// Routing state machine position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingState {
    /// Request received
    Start,
    /// Primary decision source
    Stage1,
    /// Semantic fallback
    Stage2,
    /// Static fallback
    Stage3,
    /// Plan produced
    Done,
}

impl fmt::Display for RoutingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "start",
            Self::Stage1 => "stage1",
            Self::Stage2 => "stage2",
            Self::Stage3 => "stage3",
            Self::Done => "done",
        })
    }
}

/// A request to route
#[derive(Debug, Clone)]
pub struct RoutingRequest {
    /// User query
    pub query: String,
    /// Session identifier
    pub session_id: String,
    /// Conversation context; read from memory when absent
    pub context: Option<ConversationContext>,
}

impl RoutingRequest {
    /// Create a request without context
    #[must_use]
    pub fn new(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            context: None,
        }
    }

    /// Attach conversation context
    #[must_use]
    pub fn with_context(mut self, context: ConversationContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Why a stage did not produce an accepted decision
#[derive(Debug, Error)]
pub(crate) enum StageFailure {
    #[error("{0}")]
    Source(RetryError<SourceError>),

    #[error("cancelled")]
    Cancelled,

    #[error("rejected by validator: {0}")]
    Invalid(#[from] ValidationError),

    #[error("confidence {confidence} below `{route}` threshold {threshold}")]
    BelowThreshold {
        route: Route,
        confidence: f64,
        threshold: f64,
    },

    #[error("route `{0}` is never accepted")]
    Ungated(Route),

    #[error("semantic router not configured")]
    NoSemanticRouter,

    #[error("{0}")]
    Embedding(Error),
}

impl StageFailure {
    fn kind(&self) -> &'static str {
        match self {
            Self::Source(_) => "source",
            Self::Cancelled => "cancelled",
            Self::Invalid(_) => "invalid",
            Self::BelowThreshold { .. } => "below_threshold",
            Self::Ungated(_) => "ungated",
            Self::NoSemanticRouter => "no_router",
            Self::Embedding(_) => "embedding",
        }
    }
}

/// The fixed Stage-3 decision
#[must_use]
pub fn static_fallback_decision() -> RoutingDecision {
    let mut decision = RoutingDecision::new(Route::Chat, 0.0);
    decision.response_mode = ResponseMode::Direct;
    decision.reasoning = STATIC_FALLBACK_REASONING.to_string();
    decision
}

/// Escalates a request through the three routing stages
pub struct StageOrchestrator {
    source: Arc<dyn DecisionSource>,
    semantic: Option<SemanticRouter>,
    memory: Option<SharedMemory>,
    primary_gate: ConfidenceGate,
    semantic_gate: ConfidenceGate,
    retry: RetryConfig,
    attempt_timeout: Duration,
    memory_timeout: Duration,
    session_ttl: Duration,
    metrics: MetricsRegistry,
}

impl StageOrchestrator {
    /// Create an orchestrator; fails on invalid configuration
    pub fn new(config: &RoutingConfig, source: Arc<dyn DecisionSource>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            semantic: None,
            memory: None,
            primary_gate: ConfidenceGate::from_config(config)?,
            semantic_gate: ConfidenceGate::uniform(config.semantic_floor)?,
            retry: config.stage1.retry_config(),
            attempt_timeout: config.stage1.timeout(),
            memory_timeout: config.stage1.timeout(),
            session_ttl: config.context.session_ttl(),
            metrics: MetricsRegistry::new(),
        })
    }

    /// Enable Stage 2
    #[must_use]
    pub fn with_semantic_router(mut self, router: SemanticRouter) -> Self {
        self.semantic = Some(router);
        self
    }

    /// Read context and persist follow-ups through `memory`
    #[must_use]
    pub fn with_memory(mut self, memory: SharedMemory) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Record outcomes into a shared registry
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsRegistry) -> Self {
        self.metrics = metrics;
        self
    }

    /// Routing outcome metrics
    #[must_use]
    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Whether Stage 2 is available
    #[must_use]
    pub fn has_semantic_router(&self) -> bool {
        self.semantic.is_some()
    }

    /// Route a request to an [`ExecutionPlan`]
    ///
    /// Cancelling `cancel` aborts Stage 1, including its memory reads, and
    /// continues with Stage 2. Memory calls are bounded by the Stage-1
    /// attempt timeout.
    #[instrument(skip_all, fields(session_id = %request.session_id, source = %self.source.name()))]
    pub async fn route(&self, request: &RoutingRequest, cancel: &CancellationToken) -> ExecutionPlan {
        transition(RoutingState::Start, RoutingState::Stage1, "request received");

        let started = Instant::now();
        let stage1 = self.stage1(request, cancel).await;
        self.metrics
            .histogram(STAGE1_LATENCY_METRIC)
            .observe_duration(started.elapsed());

        let stage1_failure = match stage1 {
            Ok(decision) => return self.finish(request, decision, StageUsed::Primary).await,
            Err(failure) => failure,
        };
        self.record_rejection(RoutingState::Stage1, &stage1_failure);
        transition(
            RoutingState::Stage1,
            RoutingState::Stage2,
            &stage1_failure.to_string(),
        );

        let stage2_failure = match self.stage2(request).await {
            Ok(decision) => {
                return self
                    .finish(request, decision, StageUsed::SemanticFallback)
                    .await
            }
            Err(failure) => failure,
        };
        self.record_rejection(RoutingState::Stage2, &stage2_failure);
        transition(
            RoutingState::Stage2,
            RoutingState::Stage3,
            &stage2_failure.to_string(),
        );

        warn!(
            target: UNRESOLVED_TARGET,
            session_id = %request.session_id,
            query = %request.query,
            stage1 = %stage1_failure,
            stage2 = %stage2_failure,
            "Unresolved routing request"
        );
        self.finish(request, static_fallback_decision(), StageUsed::StaticFallback)
            .await
    }

    async fn stage1(
        &self,
        request: &RoutingRequest,
        cancel: &CancellationToken,
    ) -> std::result::Result<RoutingDecision, StageFailure> {
        let call = async {
            let decision_request = self.decision_request(request).await;
            self.call_source(&decision_request).await
        };

        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(StageFailure::Cancelled),
            outcome = call => outcome,
        };

        let payload = match outcome {
            Ok(payload) => payload,
            Err(RetryError {
                last_error: SourceError::Malformed(raw),
                ..
            }) => {
                debug!("Malformed primary payload, parsing leniently");
                DecisionPayload::Text(raw)
            }
            Err(e) => return Err(StageFailure::Source(e)),
        };

        let parsed = parse(&payload);
        if parsed.degraded {
            warn!(
                diagnostics = ?parsed.diagnostics,
                "Primary decision is degraded"
            );
        }

        validate_decision(&parsed.decision)?;
        gate(&self.primary_gate, parsed.decision)
    }

    async fn call_source(
        &self,
        request: &DecisionRequest,
    ) -> std::result::Result<DecisionPayload, RetryError<SourceError>> {
        let source = &self.source;
        let attempt_timeout = self.attempt_timeout;
        retry_with_backoff(
            &self.retry,
            move || async move {
                match tokio::time::timeout(attempt_timeout, source.decide(request)).await {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::Timeout(attempt_timeout.as_millis() as u64)),
                }
            },
            SourceError::is_transient,
        )
        .await
    }

    async fn stage2(
        &self,
        request: &RoutingRequest,
    ) -> std::result::Result<RoutingDecision, StageFailure> {
        let router = self.semantic.as_ref().ok_or(StageFailure::NoSemanticRouter)?;
        let (route, score) = router
            .classify(&request.query)
            .await
            .map_err(StageFailure::Embedding)?;

        let decision = SemanticRouter::synthesize(route, score, &request.query);
        validate_decision(&decision)?;
        gate(&self.semantic_gate, decision)
    }

    async fn finish(
        &self,
        request: &RoutingRequest,
        decision: RoutingDecision,
        stage_used: StageUsed,
    ) -> ExecutionPlan {
        let from = match stage_used {
            StageUsed::Primary => RoutingState::Stage1,
            StageUsed::SemanticFallback => RoutingState::Stage2,
            StageUsed::StaticFallback => RoutingState::Stage3,
        };
        info!(
            from = %from,
            to = %RoutingState::Done,
            stage_used = %stage_used,
            route = %decision.route,
            confidence = decision.confidence,
            "Routing decision accepted"
        );

        self.metrics.counter(&plan_metric(stage_used)).inc();
        self.persist_follow_up(request, &decision).await;

        ExecutionPlan {
            decision,
            stage_used,
            timestamp: Utc::now(),
            session_id: request.session_id.clone(),
        }
    }

    fn record_rejection(&self, stage: RoutingState, failure: &StageFailure) {
        self.metrics
            .counter(&rejection_metric(stage, failure.kind()))
            .inc();
    }
}

fn transition(from: RoutingState, to: RoutingState, reason: &str) {
    if to == RoutingState::Stage1 {
        debug!(from = %from, to = %to, reason, "Routing transition");
    } else {
        warn!(from = %from, to = %to, reason, "Routing transition");
    }
}

fn gate(
    gate: &ConfidenceGate,
    decision: RoutingDecision,
) -> std::result::Result<RoutingDecision, StageFailure> {
    match gate.threshold(decision.route) {
        None => Err(StageFailure::Ungated(decision.route)),
        Some(_) if gate.accept(&decision) => Ok(decision),
        Some(threshold) => Err(StageFailure::BelowThreshold {
            route: decision.route,
            confidence: decision.confidence,
            threshold,
        }),
    }
}
