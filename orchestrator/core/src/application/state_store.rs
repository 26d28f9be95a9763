// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared State Store Application Service
//!
//! Owns every in-flight workflow's state and serializes mutations per
//! request. The lock table is keyed by `RequestId`, so unrelated workflows
//! never contend; within one workflow, mutations are strictly ordered no
//! matter how many agents touch it concurrently.
//!
//! Every successful call through [`SharedStateStore::with_state`] appends
//! exactly one history entry and bumps `updated_at`, so history length is
//! the mutation count.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::capability::AgentName;
use crate::domain::state::{
    HistoryAction, HistoryEntry, RequestId, Stage, StateError, WorkflowState,
};

#[derive(Default)]
pub struct SharedStateStore {
    states: DashMap<RequestId, Arc<Mutex<WorkflowState>>>,
}

impl SharedStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the state for a new request. Fails with `AlreadyExists` when
    /// the request id is reused.
    pub fn create_state(
        &self,
        request_id: RequestId,
        user_id: impl Into<String>,
        initial_agent: AgentName,
        initial_data: HashMap<String, serde_json::Value>,
    ) -> Result<WorkflowState, StateError> {
        match self.states.entry(request_id) {
            Entry::Occupied(_) => Err(StateError::AlreadyExists(request_id)),
            Entry::Vacant(vacant) => {
                let state = WorkflowState::new(request_id, user_id, initial_agent, initial_data);
                debug!(request_id = %request_id, agent = %state.current_agent, "workflow state created");
                vacant.insert(Arc::new(Mutex::new(state.clone())));
                Ok(state)
            }
        }
    }

    /// Run `f` against the state under the per-request lock.
    ///
    /// On success, appends one history entry describing the mutation (the
    /// entry's `agent` is the agent that held control when the call began)
    /// and bumps `updated_at`. An error from `f` is re-raised after the lock
    /// is released and leaves no history entry behind.
    pub async fn with_state<T, F>(
        &self,
        request_id: &RequestId,
        action: HistoryAction,
        f: F,
    ) -> Result<T, StateError>
    where
        F: FnOnce(&mut WorkflowState) -> Result<T, StateError>,
    {
        let cell = self.cell(request_id)?;
        let mut state = cell.lock().await;

        let from_stage = state.stage;
        let agent_before = state.current_agent.clone();

        let value = f(&mut state)?;

        let now = chrono::Utc::now();
        let to_stage = state.stage;
        state.history.push(HistoryEntry {
            agent: agent_before,
            timestamp: now,
            action,
            from_stage,
            to_stage,
        });
        state.updated_at = now;

        Ok(value)
    }

    /// Convenience wrapper: transition the stage.
    pub async fn update_stage(
        &self,
        request_id: &RequestId,
        stage: Stage,
        action: HistoryAction,
    ) -> Result<(), StateError> {
        self.with_state(request_id, action, |state| {
            state.stage = stage;
            Ok(())
        })
        .await
    }

    /// Convenience wrapper: record a history entry without touching anything
    /// else.
    pub async fn append_history(
        &self,
        request_id: &RequestId,
        action: HistoryAction,
    ) -> Result<(), StateError> {
        self.with_state(request_id, action, |_| Ok(())).await
    }

    /// Convenience wrapper: merge entries into the data bag.
    pub async fn merge_data(
        &self,
        request_id: &RequestId,
        entries: HashMap<String, serde_json::Value>,
    ) -> Result<(), StateError> {
        self.with_state(request_id, HistoryAction::Process, |state| {
            state.merge_data(entries);
            Ok(())
        })
        .await
    }

    /// Clone of the current state, read under the lock. Does not count as a
    /// mutation.
    pub async fn snapshot(&self, request_id: &RequestId) -> Result<WorkflowState, StateError> {
        let cell = self.cell(request_id)?;
        let state = cell.lock().await;
        Ok(state.clone())
    }

    /// Reinstall a state wholesale, replacing any existing entry. Recovery
    /// path used by the checkpoint manager's `resume`.
    pub fn restore(&self, state: WorkflowState) {
        debug!(request_id = %state.request_id, stage = %state.stage, "workflow state restored");
        self.states
            .insert(state.request_id, Arc::new(Mutex::new(state)));
    }

    /// Drop a workflow from the store, returning its final state. Intended
    /// for archival once the stage is terminal.
    pub async fn remove(&self, request_id: &RequestId) -> Result<WorkflowState, StateError> {
        let (_, cell) = self
            .states
            .remove(request_id)
            .ok_or(StateError::NotFound(*request_id))?;
        let state = cell.lock().await;
        Ok(state.clone())
    }

    pub fn contains(&self, request_id: &RequestId) -> bool {
        self.states.contains_key(request_id)
    }

    pub fn active_count(&self) -> usize {
        self.states.len()
    }

    fn cell(&self, request_id: &RequestId) -> Result<Arc<Mutex<WorkflowState>>, StateError> {
        self.states
            .get(request_id)
            .map(|entry| entry.value().clone())
            .ok_or(StateError::NotFound(*request_id))
    }
}
