// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Handoff Domain Model
//!
//! A handoff is a request to transfer control of a workflow from one agent to
//! another. Requests are immutable once created; a rejected handoff stays in
//! the audit log and a retry produces a new request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::capability::AgentName;
use crate::domain::state::{RequestId, StateError};

/// Unique identifier for a single handoff request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandoffId(pub Uuid);

impl HandoffId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandoffId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HandoffId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An agent's request to transfer control of a workflow to a peer.
///
/// `context` is the subset of workflow data the requesting agent considers
/// relevant for the target; on acceptance it is merged into the workflow's
/// data bag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRequest {
    pub handoff_id: HandoffId,
    pub request_id: RequestId,
    pub from_agent: AgentName,
    pub to_agent: AgentName,
    pub reason: String,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl HandoffRequest {
    pub fn new(
        request_id: RequestId,
        from_agent: AgentName,
        to_agent: AgentName,
        context: HashMap<String, serde_json::Value>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            handoff_id: HandoffId::new(),
            request_id,
            from_agent,
            to_agent,
            reason: reason.into(),
            context,
            timestamp: Utc::now(),
        }
    }
}

/// Why a handoff was turned down. A rejection is a signalled result, not an
/// error; the requesting side decides on retry, alternate target, or
/// escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The target agent is not currently available per the router.
    TargetUnavailable,
    /// Accepting would re-enter a recent sender within the cycle-detection
    /// window (ping-pong loop).
    CircularHandoff,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectionReason::TargetUnavailable => "target_unavailable",
            RejectionReason::CircularHandoff => "circular_handoff",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a handoff request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HandoffOutcome {
    Accepted { handoff_id: HandoffId },
    Rejected { handoff_id: HandoffId, reason: RejectionReason },
}

impl HandoffOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, HandoffOutcome::Accepted { .. })
    }
}

/// One audit-log row: the request plus what became of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffRecord {
    pub request: HandoffRequest,
    pub accepted: bool,
}

/// Infrastructure-level handoff failures. A *rejected* handoff is not an
/// error and is reported through [`HandoffOutcome`] instead.
#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error(transparent)]
    State(#[from] StateError),
}
