// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Graph Domain Model
//!
//! Node and error types for the workflow graph engine. A node is an async
//! callable that receives a snapshot of the workflow state and produces a
//! partial update; the engine applies the update through the shared state
//! store and then evaluates the node's outgoing edges.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::state::{HistoryAction, Stage, StateError, WorkflowState};

/// Name of a node within a compiled graph (e.g. `"classify"`, `"format"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeName(String);

impl NodeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Partial state update produced by one node execution.
///
/// Applied through the shared state store as a single locked mutation, so each
/// node execution contributes exactly one history entry.
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub data: HashMap<String, serde_json::Value>,
    pub stage: Option<Stage>,
    pub action: Option<HistoryAction>,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn with_action(mut self, action: HistoryAction) -> Self {
        self.action = Some(action);
        self
    }
}

/// Unrecoverable failure reported by a node. The engine records it in history
/// and ends the run.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct NodeFailure(pub String);

impl NodeFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// One executable unit in the workflow graph.
///
/// Receives an owned snapshot of the current state; mutations happen only
/// through the returned [`NodeUpdate`].
#[async_trait]
pub trait Node: Send + Sync {
    async fn execute(&self, state: WorkflowState) -> Result<NodeUpdate, NodeFailure>;
}

/// Adapter turning an async closure into a [`Node`].
///
/// ```ignore
/// let node = FnNode::new(|state| async move {
///     Ok(NodeUpdate::new().with_data("seen", json!(state.stage.to_string())))
/// }.boxed());
/// ```
pub struct FnNode<F> {
    f: F,
}

impl<F> FnNode<F>
where
    F: Fn(WorkflowState) -> BoxFuture<'static, Result<NodeUpdate, NodeFailure>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Node for FnNode<F>
where
    F: Fn(WorkflowState) -> BoxFuture<'static, Result<NodeUpdate, NodeFailure>> + Send + Sync,
{
    async fn execute(&self, state: WorkflowState) -> Result<NodeUpdate, NodeFailure> {
        (self.f)(state).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("graph has no entry node set")]
    EntryNotSet,

    #[error("entry node '{0}' is not defined")]
    EntryNotFound(NodeName),

    #[error("edge from '{from}' references undefined node '{to}'")]
    EdgeTargetNotFound { from: NodeName, to: NodeName },

    #[error("edge source '{0}' is not a defined node")]
    EdgeSourceNotFound(NodeName),

    #[error("node '{0}' is not defined")]
    UnknownNode(NodeName),

    #[error("no edge out of '{0}' matched the current state")]
    NoMatchingEdge(NodeName),

    #[error("node '{0}' exceeded its timeout")]
    NodeTimeout(NodeName),

    #[error("run was cancelled")]
    Cancelled,

    #[error("run exceeded the maximum of {0} node executions")]
    MaxIterationsExceeded(u32),

    #[error("node '{node}' failed terminally: {message}")]
    TerminalFailure { node: NodeName, message: String },

    #[error(transparent)]
    State(#[from] StateError),
}
