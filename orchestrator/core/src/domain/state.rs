// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow State Domain Model
//!
//! Defines the per-request workflow state aggregate: the record of which agent
//! currently holds control, how far the request has progressed, the open
//! key/value bag agents accumulate into, and the append-only history log.
//!
//! # Invariants
//!
//! - `history` grows monotonically and is never rewritten; every mutation made
//!   through the shared state store appends exactly one entry.
//! - `Completed` and `Failed` are absorbing stages; callers do not transition
//!   out of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::capability::AgentName;

/// Unique identifier for one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Progress stage of a workflow run.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    Routed,
    Processing,
    Handoff,
    Checkpointed,
    Completed,
    Failed,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Completed | Stage::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Created => "created",
            Stage::Routed => "routed",
            Stage::Processing => "processing",
            Stage::Handoff => "handoff",
            Stage::Checkpointed => "checkpointed",
            Stage::Completed => "completed",
            Stage::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// What a history entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Create,
    Route,
    Process,
    Handoff,
    Checkpoint,
    Timeout,
    Escalate,
    Complete,
    Fail,
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HistoryAction::Create => "create",
            HistoryAction::Route => "route",
            HistoryAction::Process => "process",
            HistoryAction::Handoff => "handoff",
            HistoryAction::Checkpoint => "checkpoint",
            HistoryAction::Timeout => "timeout",
            HistoryAction::Escalate => "escalate",
            HistoryAction::Complete => "complete",
            HistoryAction::Fail => "fail",
        };
        write!(f, "{}", s)
    }
}

/// One append-only audit record of a workflow mutation.
///
/// `agent` is the agent that held control when the mutation began (for a
/// handoff, the agent handing control away).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub agent: AgentName,
    pub timestamp: DateTime<Utc>,
    pub action: HistoryAction,
    pub from_stage: Stage,
    pub to_stage: Stage,
}

/// Workflow State Aggregate Root
///
/// One instance per in-flight request. Mutated exclusively through the
/// shared state store's locked accessor; never handed out `&mut` elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub request_id: RequestId,
    pub user_id: String,
    pub current_agent: AgentName,
    pub stage: Stage,

    /// Open key/value bag accumulated by agents over the run.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    /// Ordered, append-only mutation log.
    #[serde(default)]
    pub history: Vec<HistoryEntry>,

    /// Populated when the run ends in `Failed` (including `"cancelled"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Create the initial state for a new request, with the `create` entry
    /// already recorded.
    pub fn new(
        request_id: RequestId,
        user_id: impl Into<String>,
        initial_agent: AgentName,
        initial_data: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        let create_entry = HistoryEntry {
            agent: initial_agent.clone(),
            timestamp: now,
            action: HistoryAction::Create,
            from_stage: Stage::Created,
            to_stage: Stage::Created,
        };

        Self {
            request_id,
            user_id: user_id.into(),
            current_agent: initial_agent,
            stage: Stage::Created,
            data: initial_data,
            history: vec![create_entry],
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Merge a batch of entries into the data bag, later keys winning.
    pub fn merge_data(&mut self, entries: HashMap<String, serde_json::Value>) {
        self.data.extend(entries);
    }

    /// Mark the run failed with a reason. No-op if already terminal.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.is_terminal() {
            self.stage = Stage::Failed;
            self.failure_reason = Some(reason.into());
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("no workflow state found for request {0}")]
    NotFound(RequestId),

    #[error("workflow state already exists for request {0}")]
    AlreadyExists(RequestId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_uniqueness() {
        assert_ne!(RequestId::new(), RequestId::new());
    }

    #[test]
    fn test_terminal_stages() {
        assert!(Stage::Completed.is_terminal());
        assert!(Stage::Failed.is_terminal());
        assert!(!Stage::Processing.is_terminal());
        assert!(!Stage::Handoff.is_terminal());
    }

    #[test]
    fn test_new_state_records_create_entry() {
        let state = WorkflowState::new(
            RequestId::new(),
            "user-1",
            AgentName::new("TwitterSpecialist"),
            HashMap::new(),
        );

        assert_eq!(state.stage, Stage::Created);
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.history[0].action, HistoryAction::Create);
        assert_eq!(state.history[0].agent.as_str(), "TwitterSpecialist");
    }

    #[test]
    fn test_fail_is_noop_once_terminal() {
        let mut state = WorkflowState::new(
            RequestId::new(),
            "user-1",
            AgentName::new("TwitterSpecialist"),
            HashMap::new(),
        );

        state.stage = Stage::Completed;
        state.fail("too late");

        assert_eq!(state.stage, Stage::Completed);
        assert!(state.failure_reason.is_none());
    }

    #[test]
    fn test_merge_data_overwrites_existing_keys() {
        let mut state = WorkflowState::new(
            RequestId::new(),
            "user-1",
            AgentName::new("TwitterSpecialist"),
            HashMap::from([("k".to_string(), serde_json::json!(1))]),
        );

        state.merge_data(HashMap::from([("k".to_string(), serde_json::json!(2))]));
        assert_eq!(state.data.get("k"), Some(&serde_json::json!(2)));
    }
}
