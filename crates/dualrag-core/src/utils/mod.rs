//! Utilities for dualrag-core
//!
//! - retry: bounded retries with exponential backoff for transient failures
//! - metrics: counters and latency histograms for routing outcomes

mod metrics;
mod retry;

pub use metrics::{Counter, Histogram, MetricsRegistry, LATENCY_BUCKETS_MS};
pub use retry::{retry_with_backoff, RetryConfig, RetryError};
