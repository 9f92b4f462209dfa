//! Memory reads and writes around a routing request
//!
//! Memory is best effort here: failures and timeouts are logged and the
//! request proceeds as if the entry did not exist.

use super::StageOrchestrator;
use crate::context::{
    ConversationContext, FollowUpRecord, CONTEXT_KEY, CONVERSATION_NAMESPACE, FOLLOWUP_NAMESPACE,
};
use crate::decision::{DecisionRequest, MemoryRequirement, RoutingDecision};
use crate::error::{Error, Result};
use crate::orchestrator::RoutingRequest;
use chrono::Utc;
use std::collections::BTreeSet;
use std::future::Future;
use tracing::{debug, warn};

impl StageOrchestrator {
    /// Stage-1 input: request context, or the stored one, plus pending follow-up keys
    pub(super) async fn decision_request(&self, request: &RoutingRequest) -> DecisionRequest {
        let mut decision_request = DecisionRequest::new(&request.query, &request.session_id);
        decision_request.context = match &request.context {
            Some(context) => Some(context.clone()),
            None => self.stored_context(&request.session_id).await,
        };
        decision_request.pending_context = self.pending_context(&request.session_id).await;
        decision_request
    }

    /// Run a memory call under the memory timeout
    async fn bounded<T>(&self, op: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.memory_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(Error::Memory(format!(
                    "{op} timed out after {}ms",
                    self.memory_timeout.as_millis()
                )))
            })
    }

    async fn stored_context(&self, session_id: &str) -> Option<ConversationContext> {
        let memory = self.memory.as_ref()?;
        match self
            .bounded("load", memory.load(session_id, CONVERSATION_NAMESPACE, CONTEXT_KEY))
            .await
        {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(context) => Some(context),
                Err(e) => {
                    warn!(session_id, error = %e, "Stored conversation context is unreadable");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to load conversation context");
                None
            }
        }
    }

    async fn pending_context(&self, session_id: &str) -> Vec<String> {
        let Some(memory) = self.memory.as_ref() else {
            return Vec::new();
        };
        let records = match self
            .bounded("get_all", memory.get_all(session_id, FOLLOWUP_NAMESPACE))
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to load follow-up records");
                return Vec::new();
            }
        };

        let mut keys = BTreeSet::new();
        for (route, value) in records {
            match serde_json::from_value::<FollowUpRecord>(value) {
                Ok(record) => keys.extend(record.context_to_preserve),
                Err(e) => debug!(session_id, route = %route, error = %e, "Skipping follow-up record"),
            }
        }
        keys.into_iter().collect()
    }

    /// Save a follow-up record when the accepted decision asks for one
    pub(super) async fn persist_follow_up(
        &self,
        request: &RoutingRequest,
        decision: &RoutingDecision,
    ) {
        if !decision.follow_up_needed {
            return;
        }
        let ttl = match decision.memory_requirement {
            MemoryRequirement::None => return,
            MemoryRequirement::Session => Some(self.session_ttl),
            MemoryRequirement::Persistent => None,
        };
        let Some(memory) = self.memory.as_ref() else {
            debug!("Follow-up requested but no memory is configured");
            return;
        };

        let record = FollowUpRecord {
            route: decision.route,
            context_to_preserve: decision.context_to_preserve.clone(),
            query: request.query.clone(),
            saved_at: Utc::now(),
        };
        let value = match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to encode follow-up record");
                return;
            }
        };

        let save = memory.save(
            &request.session_id,
            FOLLOWUP_NAMESPACE,
            decision.route.as_str(),
            value,
            ttl,
        );
        match self.bounded("save", save).await {
            Ok(()) => debug!(
                session_id = %request.session_id,
                route = %decision.route,
                keys = record.context_to_preserve.len(),
                "Follow-up context saved"
            ),
            Err(e) => warn!(
                session_id = %request.session_id,
                backend = memory.name(),
                error = %e,
                "Failed to save follow-up context"
            ),
        }
    }
}
