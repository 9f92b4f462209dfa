//! Process-local memory backend

use super::MemoryAccessor;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

fn is_production() -> bool {
    std::env::var("DUALRAG_ENV")
        .map(|v| v.eq_ignore_ascii_case("production"))
        .unwrap_or(false)
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

type Scope = (String, String);

/// In-memory store (development and tests)
///
/// Contents are lost on restart. One lock covers every entry and is held for
/// a single operation only. Expired entries are evicted when touched.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<Scope, HashMap<String, Entry>>>,
}

impl InMemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        if is_production() {
            warn!(
                "InMemoryStore in production: session memory is lost on restart \
                 and not shared between instances. Use the redis backend instead."
            );
        } else {
            info!("Initializing in-memory session store");
        }
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Scope, HashMap<String, Entry>>>> {
        self.entries
            .lock()
            .map_err(|_| Error::Memory("memory store lock poisoned".to_string()))
    }

    fn scope(session_id: &str, namespace: &str) -> Scope {
        (session_id.to_string(), namespace.to_string())
    }

    /// Live entries across all sessions
    pub fn len(&self) -> Result<usize> {
        let now = Instant::now();
        Ok(self
            .lock()?
            .values()
            .flat_map(HashMap::values)
            .filter(|e| e.is_live(now))
            .count())
    }

    /// Whether no live entry exists
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl MemoryAccessor for InMemoryStore {
    async fn save(
        &self,
        session_id: &str,
        namespace: &str,
        key: &str,
        value: Value,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let entry = Entry {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.lock()?
            .entry(Self::scope(session_id, namespace))
            .or_default()
            .insert(key.to_string(), entry);
        debug!(session_id, namespace, key, "Memory entry saved");
        Ok(())
    }

    async fn load(&self, session_id: &str, namespace: &str, key: &str) -> Result<Option<Value>> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let Some(scope) = entries.get_mut(&Self::scope(session_id, namespace)) else {
            return Ok(None);
        };

        match scope.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                scope.remove(key);
                debug!(session_id, namespace, key, "Expired memory entry evicted");
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn get_all(&self, session_id: &str, namespace: &str) -> Result<HashMap<String, Value>> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let Some(scope) = entries.get_mut(&Self::scope(session_id, namespace)) else {
            return Ok(HashMap::new());
        };

        scope.retain(|_, entry| entry.is_live(now));
        Ok(scope
            .iter()
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect())
    }

    async fn delete(&self, session_id: &str, namespace: &str, key: &str) -> Result<bool> {
        let now = Instant::now();
        let mut entries = self.lock()?;
        let removed = entries
            .get_mut(&Self::scope(session_id, namespace))
            .and_then(|scope| scope.remove(key))
            .is_some_and(|entry| entry.is_live(now));
        Ok(removed)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_save_load_delete() {
        let store = InMemoryStore::new();
        store
            .save("s1", "followup", "sql_rag", json!({"a": 1}), None)
            .await
            .unwrap();

        assert_eq!(
            store.load("s1", "followup", "sql_rag").await.unwrap(),
            Some(json!({"a": 1}))
        );
        assert_eq!(store.load("s2", "followup", "sql_rag").await.unwrap(), None);
        assert_eq!(store.load("s1", "other", "sql_rag").await.unwrap(), None);

        assert!(store.delete("s1", "followup", "sql_rag").await.unwrap());
        assert!(!store.delete("s1", "followup", "sql_rag").await.unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let store = InMemoryStore::new();
        store.save("s1", "ns", "k", json!(1), None).await.unwrap();
        store.save("s1", "ns", "k", json!(2), None).await.unwrap();
        assert_eq!(store.load("s1", "ns", "k").await.unwrap(), Some(json!(2)));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_get_all_is_namespace_scoped() {
        let store = InMemoryStore::new();
        store.save("s1", "ns", "a", json!("x"), None).await.unwrap();
        store.save("s1", "ns", "b", json!("y"), None).await.unwrap();
        store.save("s1", "other", "c", json!("z"), None).await.unwrap();

        let all = store.get_all("s1", "ns").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["b"], json!("y"));
        assert!(store.get_all("s9", "ns").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_is_checked_on_access() {
        let store = InMemoryStore::new();
        store
            .save("s1", "ns", "short", json!(1), Some(Duration::from_secs(10)))
            .await
            .unwrap();
        store.save("s1", "ns", "forever", json!(2), None).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(store.load("s1", "ns", "short").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.load("s1", "ns", "short").await.unwrap().is_none());
        assert!(!store.delete("s1", "ns", "short").await.unwrap());

        let all = store.get_all("s1", "ns").await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("forever"));
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .save("s1", "ns", &format!("k{i}"), json!(i), None)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.get_all("s1", "ns").await.unwrap().len(), 16);
    }
}
