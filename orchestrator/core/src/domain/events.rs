// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Orchestration Domain Events
//!
//! Events published on the in-memory event bus as workflows progress.
//! Observers (log sinks, progress reporters, the host's chat front-end) can
//! subscribe to all events or filter by request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::capability::AgentName;
use crate::domain::checkpoint::CheckpointId;
use crate::domain::handoff::{HandoffId, RejectionReason};
use crate::domain::state::{RequestId, Stage};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    RequestCreated {
        request_id: RequestId,
        agent: AgentName,
        timestamp: DateTime<Utc>,
    },
    HandoffAccepted {
        request_id: RequestId,
        handoff_id: HandoffId,
        from_agent: AgentName,
        to_agent: AgentName,
    },
    HandoffRejected {
        request_id: RequestId,
        handoff_id: HandoffId,
        from_agent: AgentName,
        to_agent: AgentName,
        reason: RejectionReason,
    },
    CheckpointWritten {
        request_id: RequestId,
        checkpoint_id: CheckpointId,
        stage: Stage,
    },
    CheckpointRestored {
        request_id: RequestId,
        checkpoint_id: CheckpointId,
    },
    Escalated {
        request_id: RequestId,
        team: String,
        fallback: AgentName,
    },
    RequestCompleted {
        request_id: RequestId,
        success: bool,
    },
}

impl OrchestrationEvent {
    /// The request this event belongs to, for per-request subscriptions.
    pub fn request_id(&self) -> RequestId {
        match self {
            OrchestrationEvent::RequestCreated { request_id, .. }
            | OrchestrationEvent::HandoffAccepted { request_id, .. }
            | OrchestrationEvent::HandoffRejected { request_id, .. }
            | OrchestrationEvent::CheckpointWritten { request_id, .. }
            | OrchestrationEvent::CheckpointRestored { request_id, .. }
            | OrchestrationEvent::Escalated { request_id, .. }
            | OrchestrationEvent::RequestCompleted { request_id, .. } => *request_id,
        }
    }
}
