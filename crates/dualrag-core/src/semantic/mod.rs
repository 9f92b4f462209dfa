//! Semantic - embedding similarity fallback
//!
//! - `prototypes`: immutable per-route centroid vectors, built once at startup
//! - `router`: nearest-prototype classification and synthetic decisions

mod prototypes;
mod router;

pub use prototypes::PrototypeCache;
pub use router::{SemanticRouter, SEMANTIC_REASONING};
