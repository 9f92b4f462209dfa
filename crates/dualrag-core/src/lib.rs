//! DualRAG Core - Routing and decision-validation engine
//!
//! This crate turns an unreliable decision signal into a validated,
//! confidence-scored [`ExecutionPlan`]:
//! - Decision: schema, validator, lenient parser and decision sources
//! - Semantic: embedding similarity router over cached route prototypes
//! - Gate: per-route confidence thresholds
//! - Orchestrator: primary -> semantic fallback -> static fallback
//! - Memory: session key/value accessor with in-memory and Redis backends

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod gate;
pub mod memory;
pub mod orchestrator;
pub mod semantic;
pub mod utils;

pub use config::{ContextConfig, RoutingConfig, Stage1Config};
pub use context::{ConversationContext, ConversationTurn, FollowUpRecord};
pub use decision::{
    parse, routing_tool, validate, validate_decision, DecisionPayload, DecisionRequest,
    DecisionSource, ExecutionPlan, LlmDecisionSource, MemoryRequirement, ParsedDecision,
    ResponseMode, Route, RoutingDecision, SourceError, StageUsed, ValidationError,
};
pub use error::{Error, Result};
pub use gate::ConfidenceGate;
pub use memory::{InMemoryStore, MemoryAccessor, RedisMemoryStore, SharedMemory};
pub use orchestrator::{
    plan_metric, rejection_metric, static_fallback_decision, RoutingRequest, RoutingState,
    StageOrchestrator, STAGE1_LATENCY_METRIC,
};
pub use semantic::{PrototypeCache, SemanticRouter};
pub use utils::{retry_with_backoff, MetricsRegistry, RetryConfig, RetryError};
