//! Memory - session key/value accessor
//!
//! Values are JSON, addressed by `(session_id, namespace, key)`, with an
//! optional TTL checked lazily on access. Backends:
//! - `InMemoryStore`: process-local, for development and tests
//! - `RedisMemoryStore`: shared, survives restarts

mod in_memory;
mod redis_store;

pub use in_memory::InMemoryStore;
pub use redis_store::RedisMemoryStore;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Session-scoped key/value storage
#[async_trait]
pub trait MemoryAccessor: Send + Sync {
    /// Store `value`, replacing any previous one; `ttl` of `None` never expires
    async fn save(
        &self,
        session_id: &str,
        namespace: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<()>;

    /// Value under `key`, if present and not expired
    async fn load(&self, session_id: &str, namespace: &str, key: &str) -> Result<Option<Value>>;

    /// Every live entry of a namespace
    async fn get_all(&self, session_id: &str, namespace: &str) -> Result<HashMap<String, Value>>;

    /// Remove `key`; returns whether a live entry was removed
    async fn delete(&self, session_id: &str, namespace: &str, key: &str) -> Result<bool>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// Shared memory handle
pub type SharedMemory = Arc<dyn MemoryAccessor>;
