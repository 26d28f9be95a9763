// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Handoff Manager Application Service
//!
//! Validates and executes agent-to-agent control transfers. Every request,
//! accepted or rejected, lands in an append-only per-workflow audit log,
//! which doubles as the input to cycle detection.
//!
//! Cycle detection is a sliding window over that log rather than a graph
//! check: the handoff graph is built dynamically at runtime, so a handoff is
//! rejected when its target already appears as a *sender* within the last
//! `cycle_window` requests for the same workflow. That stops A→B→A ping-pong
//! without forbidding long forward chains.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::application::router::AgentRouter;
use crate::application::state_store::SharedStateStore;
use crate::domain::capability::AgentName;
use crate::domain::config::HandoffConfig;
use crate::domain::events::OrchestrationEvent;
use crate::domain::handoff::{
    HandoffError, HandoffOutcome, HandoffRecord, HandoffRequest, RejectionReason,
};
use crate::domain::state::{HistoryAction, RequestId, Stage};
use crate::infrastructure::event_bus::EventBus;

pub struct HandoffManager {
    store: Arc<SharedStateStore>,
    router: Arc<AgentRouter>,
    events: Arc<EventBus>,
    config: HandoffConfig,
    audit: Mutex<HashMap<RequestId, Vec<HandoffRecord>>>,
}

impl HandoffManager {
    pub fn new(
        store: Arc<SharedStateStore>,
        router: Arc<AgentRouter>,
        events: Arc<EventBus>,
        config: HandoffConfig,
    ) -> Self {
        Self {
            store,
            router,
            events,
            config,
            audit: Mutex::new(HashMap::new()),
        }
    }

    /// Ask to transfer control of `request_id` from `from` to `to`.
    ///
    /// A rejection is a signalled [`HandoffOutcome::Rejected`], not an error;
    /// the requesting side decides on retry, alternate target, or escalation.
    /// Errors are reserved for infrastructure failures such as an unknown
    /// request id.
    pub async fn request_handoff(
        &self,
        request_id: RequestId,
        from: AgentName,
        to: AgentName,
        context: HashMap<String, serde_json::Value>,
        reason: impl Into<String>,
    ) -> Result<HandoffOutcome, HandoffError> {
        let request = HandoffRequest::new(request_id, from, to, context, reason);

        let rejection = if !self.router.is_available(&request.to_agent) {
            Some(RejectionReason::TargetUnavailable)
        } else if self.would_cycle(&request).await {
            Some(RejectionReason::CircularHandoff)
        } else {
            None
        };

        let outcome = match rejection {
            Some(reason) => {
                warn!(
                    request_id = %request.request_id,
                    from = %request.from_agent,
                    to = %request.to_agent,
                    reason = %reason,
                    "handoff rejected"
                );
                self.events.publish(OrchestrationEvent::HandoffRejected {
                    request_id: request.request_id,
                    handoff_id: request.handoff_id,
                    from_agent: request.from_agent.clone(),
                    to_agent: request.to_agent.clone(),
                    reason,
                });
                HandoffOutcome::Rejected {
                    handoff_id: request.handoff_id,
                    reason,
                }
            }
            None => {
                self.accept(&request).await?;
                info!(
                    request_id = %request.request_id,
                    from = %request.from_agent,
                    to = %request.to_agent,
                    "handoff accepted"
                );
                self.events.publish(OrchestrationEvent::HandoffAccepted {
                    request_id: request.request_id,
                    handoff_id: request.handoff_id,
                    from_agent: request.from_agent.clone(),
                    to_agent: request.to_agent.clone(),
                });
                HandoffOutcome::Accepted {
                    handoff_id: request.handoff_id,
                }
            }
        };

        let accepted = outcome.is_accepted();
        self.audit
            .lock()
            .await
            .entry(request_id)
            .or_default()
            .push(HandoffRecord { request, accepted });

        Ok(outcome)
    }

    /// Full audit trail for one workflow, in request order.
    pub async fn history_for(&self, request_id: &RequestId) -> Vec<HandoffRecord> {
        self.audit
            .lock()
            .await
            .get(request_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop the audit log for a finished workflow.
    pub async fn forget(&self, request_id: &RequestId) {
        self.audit.lock().await.remove(request_id);
    }

    async fn would_cycle(&self, request: &HandoffRequest) -> bool {
        let audit = self.audit.lock().await;
        let Some(records) = audit.get(&request.request_id) else {
            return false;
        };

        let window = records
            .iter()
            .rev()
            .take(self.config.cycle_window);
        for record in window {
            if record.request.from_agent == request.to_agent {
                debug!(
                    request_id = %request.request_id,
                    to = %request.to_agent,
                    prior_handoff = %record.request.handoff_id,
                    "cycle detected within window"
                );
                return true;
            }
        }
        false
    }

    async fn accept(&self, request: &HandoffRequest) -> Result<(), HandoffError> {
        let to = request.to_agent.clone();
        let context = request.context.clone();
        self.store
            .with_state(&request.request_id, HistoryAction::Handoff, move |state| {
                state.current_agent = to;
                state.stage = Stage::Handoff;
                state.merge_data(context);
                Ok(())
            })
            .await?;
        Ok(())
    }
}
