//! Redis memory backend
//!
//! Each entry is its own key so Redis can expire it. A per-namespace set
//! indexes the entry keys for `get_all`; members whose entry has expired are
//! pruned when the namespace is read.

use super::MemoryAccessor;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Default key prefix
pub const DEFAULT_PREFIX: &str = "dualrag:memory:";

/// Redis-backed memory store
pub struct RedisMemoryStore {
    client: redis::Client,
    prefix: String,
}

impl RedisMemoryStore {
    /// Create a store for `redis_url`
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid. No connection is made yet.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Memory(format!("invalid Redis URL: {e}")))?;
        Ok(Self {
            client,
            prefix: DEFAULT_PREFIX.to_string(),
        })
    }

    /// Set the key prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn entry_key(&self, session_id: &str, namespace: &str, key: &str) -> String {
        format!("{}entry:{}:{}:{}", self.prefix, session_id, namespace, key)
    }

    fn index_key(&self, session_id: &str, namespace: &str) -> String {
        format!("{}index:{}:{}", self.prefix, session_id, namespace)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::Memory(format!("Redis connection failed: {e}")))
    }
}

fn redis_error(op: &str) -> impl FnOnce(redis::RedisError) -> Error + '_ {
    move |e| Error::Memory(format!("Redis {op} failed: {e}"))
}

#[async_trait]
impl MemoryAccessor for RedisMemoryStore {
    async fn save(
        &self,
        session_id: &str,
        namespace: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let mut conn = self.connection().await?;
        let entry_key = self.entry_key(session_id, namespace, key);
        let json = serde_json::to_string(&value)?;

        let mut set = redis::cmd("SET");
        set.arg(&entry_key).arg(&json);
        if let Some(ttl) = ttl {
            set.arg("EX").arg(ttl.as_secs().max(1));
        }

        redis::pipe()
            .atomic()
            .add_command(set)
            .ignore()
            .cmd("SADD")
            .arg(self.index_key(session_id, namespace))
            .arg(key)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(redis_error("SET"))?;

        debug!(session_id, namespace, key, ttl = ?ttl, "Memory entry saved to Redis");
        Ok(())
    }

    async fn load(&self, session_id: &str, namespace: &str, key: &str) -> Result<Option<Value>> {
        let mut conn = self.connection().await?;
        let data: Option<String> = redis::cmd("GET")
            .arg(self.entry_key(session_id, namespace, key))
            .query_async(&mut conn)
            .await
            .map_err(redis_error("GET"))?;

        data.map(|json| serde_json::from_str(&json).map_err(Error::from))
            .transpose()
    }

    async fn get_all(&self, session_id: &str, namespace: &str) -> Result<HashMap<String, Value>> {
        let mut conn = self.connection().await?;
        let index_key = self.index_key(session_id, namespace);

        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(&index_key)
            .query_async(&mut conn)
            .await
            .map_err(redis_error("SMEMBERS"))?;
        if members.is_empty() {
            return Ok(HashMap::new());
        }

        let entry_keys: Vec<String> = members
            .iter()
            .map(|m| self.entry_key(session_id, namespace, m))
            .collect();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&entry_keys)
            .query_async(&mut conn)
            .await
            .map_err(redis_error("MGET"))?;

        let mut live = HashMap::new();
        let mut stale = Vec::new();
        for (member, data) in members.into_iter().zip(values) {
            match data {
                Some(json) => match serde_json::from_str(&json) {
                    Ok(value) => {
                        live.insert(member, value);
                    }
                    Err(e) => warn!(member = %member, error = %e, "Skipping undecodable entry"),
                },
                None => stale.push(member),
            }
        }

        if !stale.is_empty() {
            debug!(count = stale.len(), namespace, "Pruning expired index members");
            redis::cmd("SREM")
                .arg(&index_key)
                .arg(&stale)
                .query_async::<()>(&mut conn)
                .await
                .map_err(redis_error("SREM"))?;
        }

        Ok(live)
    }

    async fn delete(&self, session_id: &str, namespace: &str, key: &str) -> Result<bool> {
        let mut conn = self.connection().await?;
        let (deleted, _): (i64, i64) = redis::pipe()
            .atomic()
            .cmd("DEL")
            .arg(self.entry_key(session_id, namespace, key))
            .cmd("SREM")
            .arg(self.index_key(session_id, namespace))
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(redis_error("DEL"))?;
        Ok(deleted > 0)
    }

    fn name(&self) -> &str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            RedisMemoryStore::new("not a url"),
            Err(Error::Memory(_))
        ));
    }

    #[test]
    fn test_key_layout() {
        let store = RedisMemoryStore::new("redis://127.0.0.1:6379")
            .unwrap()
            .with_prefix("t:");
        assert_eq!(store.entry_key("s1", "followup", "sql_rag"), "t:entry:s1:followup:sql_rag");
        assert_eq!(store.index_key("s1", "followup"), "t:index:s1:followup");
    }

    // Requires a running Redis instance: cargo test --features redis-tests
    #[cfg(feature = "redis-tests")]
    mod live {
        use super::*;
        use serde_json::json;

        fn store() -> RedisMemoryStore {
            let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
            RedisMemoryStore::new(&url)
                .unwrap()
                .with_prefix(format!("dualrag-test:{}:", std::process::id()))
        }

        #[tokio::test]
        async fn test_roundtrip_and_index() {
            let store = store();
            store.save("s1", "ns", "a", json!({"x": 1}), None).await.unwrap();
            store
                .save("s1", "ns", "b", json!("y"), Some(Duration::from_secs(60)))
                .await
                .unwrap();

            assert_eq!(store.load("s1", "ns", "a").await.unwrap(), Some(json!({"x": 1})));
            assert_eq!(store.get_all("s1", "ns").await.unwrap().len(), 2);

            assert!(store.delete("s1", "ns", "a").await.unwrap());
            assert!(store.delete("s1", "ns", "b").await.unwrap());
            assert!(store.get_all("s1", "ns").await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn test_expired_members_are_pruned() {
            let store = store();
            store
                .save("s2", "ns", "gone", json!(1), Some(Duration::from_secs(1)))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(1_500)).await;

            assert!(store.load("s2", "ns", "gone").await.unwrap().is_none());
            assert!(store.get_all("s2", "ns").await.unwrap().is_empty());
            assert!(!store.delete("s2", "ns", "gone").await.unwrap());
        }
    }
}
