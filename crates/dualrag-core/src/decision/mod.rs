//! Decision - routing decision contract
//!
//! - `schema`: data model and the routing tool definition
//! - `validator`: hard structural and semantic gate
//! - `parser`: lenient extraction of a candidate from raw payloads
//! - `source`: primary decision sources

mod parser;
mod schema;
mod source;
mod validator;

pub use parser::{parse, ParsedDecision};
pub use schema::{
    routing_tool, ExecutionPlan, MemoryRequirement, ResponseMode, Route, RoutingDecision,
    StageUsed, ROUTING_TOOL_NAME,
};
pub use source::{
    DecisionPayload, DecisionRequest, DecisionSource, LlmDecisionSource, SourceError,
    ROUTING_PROMPT,
};
pub use validator::{validate, validate_decision, ValidationError};
