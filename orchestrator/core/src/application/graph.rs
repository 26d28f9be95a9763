// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Workflow Graph Engine Application Service
//!
//! Declarative graph of nodes and edges driving a workflow from an entry node
//! to a terminal node. Each node execution applies its partial update through
//! the shared state store, then the node's outgoing edges are evaluated
//! against the fresh state; the first matching edge decides the next node.
//!
//! # Execution Loop
//!
//! ```text
//! loop {
//!     snapshot = store.snapshot(request)
//!     update   = node.execute(snapshot)        // bounded by the node timeout
//!     store.with_state(request, |s| apply(update))
//!     break if node is terminal
//!     next = first matching edge out of node
//! }
//! ```
//!
//! Cycles are permitted only through explicit conditional back-edges and are
//! bounded by `max_iterations`. A timed-out node is routed to the graph's
//! fallback node when one is declared; cancellation is observed between
//! nodes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::checkpoint::CheckpointManager;
use crate::application::state_store::SharedStateStore;
use crate::domain::config::EngineConfig;
use crate::domain::graph::{GraphError, Node, NodeName, NodeUpdate};
use crate::domain::state::{HistoryAction, RequestId, Stage, WorkflowState};

type EdgePredicate = Arc<dyn Fn(&WorkflowState) -> bool + Send + Sync>;

struct Edge {
    predicate: Option<EdgePredicate>,
    target: NodeName,
}

struct NodeSpec {
    node: Arc<dyn Node>,
    timeout: Option<Duration>,
}

/// Builder for a workflow graph. `compile` validates the topology and
/// produces a reusable [`CompiledGraph`].
pub struct GraphBuilder {
    nodes: HashMap<NodeName, NodeSpec>,
    edges: HashMap<NodeName, Vec<Edge>>,
    entry: Option<NodeName>,
    terminals: HashSet<NodeName>,
    fallback: Option<NodeName>,
    config: EngineConfig,
}

impl GraphBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            entry: None,
            terminals: HashSet::new(),
            fallback: None,
            config,
        }
    }

    pub fn add_node(self, name: impl Into<NodeName>, node: impl Node + 'static) -> Self {
        self.add_node_with_timeout(name, node, None)
    }

    pub fn add_node_with_timeout(
        mut self,
        name: impl Into<NodeName>,
        node: impl Node + 'static,
        timeout: Option<Duration>,
    ) -> Self {
        self.nodes.insert(
            name.into(),
            NodeSpec {
                node: Arc::new(node),
                timeout,
            },
        );
        self
    }

    /// Unconditional edge; always matches when reached in evaluation order.
    pub fn add_edge(mut self, from: impl Into<NodeName>, to: impl Into<NodeName>) -> Self {
        self.edges.entry(from.into()).or_default().push(Edge {
            predicate: None,
            target: to.into(),
        });
        self
    }

    /// Conditional edge; matches when the predicate holds over the state
    /// produced by the source node. Edges are evaluated in insertion order.
    pub fn add_conditional_edge(
        mut self,
        from: impl Into<NodeName>,
        to: impl Into<NodeName>,
        predicate: impl Fn(&WorkflowState) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.edges.entry(from.into()).or_default().push(Edge {
            predicate: Some(Arc::new(predicate)),
            target: to.into(),
        });
        self
    }

    pub fn set_entry(mut self, name: impl Into<NodeName>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Declare a node terminal: the run ends after it executes. Nodes with no
    /// outgoing edges are terminal implicitly.
    pub fn mark_terminal(mut self, name: impl Into<NodeName>) -> Self {
        self.terminals.insert(name.into());
        self
    }

    /// Node that receives control when another node times out.
    pub fn set_fallback(mut self, name: impl Into<NodeName>) -> Self {
        self.fallback = Some(name.into());
        self
    }

    pub fn compile(self) -> Result<CompiledGraph, GraphError> {
        let entry = self.entry.ok_or(GraphError::EntryNotSet)?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::EntryNotFound(entry));
        }

        for (from, edges) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::EdgeSourceNotFound(from.clone()));
            }
            for edge in edges {
                if !self.nodes.contains_key(&edge.target) {
                    return Err(GraphError::EdgeTargetNotFound {
                        from: from.clone(),
                        to: edge.target.clone(),
                    });
                }
            }
        }

        if let Some(fallback) = &self.fallback {
            if !self.nodes.contains_key(fallback) {
                return Err(GraphError::UnknownNode(fallback.clone()));
            }
        }

        Ok(CompiledGraph {
            nodes: self.nodes,
            edges: self.edges,
            entry,
            terminals: self.terminals,
            fallback: self.fallback,
            config: self.config,
        })
    }
}

/// Everything a run needs besides the graph itself. The state for
/// `request_id` must already exist in the store.
pub struct GraphContext {
    pub store: Arc<SharedStateStore>,
    pub request_id: RequestId,
    pub cancellation: CancellationToken,
    /// When present, a checkpoint is written after every node that changes
    /// the stage (the graph's stage boundaries).
    pub checkpoints: Option<Arc<CheckpointManager>>,
}

/// A validated, runnable workflow graph.
pub struct CompiledGraph {
    nodes: HashMap<NodeName, NodeSpec>,
    edges: HashMap<NodeName, Vec<Edge>>,
    entry: NodeName,
    terminals: HashSet<NodeName>,
    fallback: Option<NodeName>,
    config: EngineConfig,
}

impl CompiledGraph {
    /// Drive the workflow from the entry node to a terminal node, returning
    /// the final state.
    pub async fn run(&self, ctx: &GraphContext) -> Result<WorkflowState, GraphError> {
        let mut current = self.entry.clone();
        let mut executed: u32 = 0;

        info!(request_id = %ctx.request_id, entry = %current, "graph run started");

        loop {
            if ctx.cancellation.is_cancelled() {
                self.fail_state(ctx, "cancelled").await?;
                return Err(GraphError::Cancelled);
            }

            executed += 1;
            if executed > self.config.max_iterations {
                self.fail_state(ctx, "max iterations exceeded").await?;
                return Err(GraphError::MaxIterationsExceeded(self.config.max_iterations));
            }

            let spec = self
                .nodes
                .get(&current)
                .ok_or_else(|| GraphError::UnknownNode(current.clone()))?;
            let snapshot = ctx.store.snapshot(&ctx.request_id).await?;
            debug!(request_id = %ctx.request_id, node = %current, "executing node");

            let limit = spec.timeout.or(self.config.default_node_timeout);
            let outcome = match limit {
                Some(limit) => match tokio::time::timeout(limit, spec.node.execute(snapshot)).await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(request_id = %ctx.request_id, node = %current, "node timed out");
                        ctx.store
                            .append_history(&ctx.request_id, HistoryAction::Timeout)
                            .await?;

                        match &self.fallback {
                            Some(fallback) if *fallback != current => {
                                current = fallback.clone();
                                continue;
                            }
                            _ => {
                                self.fail_state(ctx, format!("node '{}' timed out", current))
                                    .await?;
                                return Err(GraphError::NodeTimeout(current));
                            }
                        }
                    }
                },
                None => spec.node.execute(snapshot).await,
            };

            let update = match outcome {
                Ok(update) => update,
                Err(failure) => {
                    self.fail_state(ctx, failure.0.clone()).await?;
                    return Err(GraphError::TerminalFailure {
                        node: current,
                        message: failure.0,
                    });
                }
            };

            let stage_boundary = update.stage.is_some();
            self.apply_update(ctx, update).await?;

            if stage_boundary {
                if let Some(checkpoints) = &ctx.checkpoints {
                    // A failed write downgrades durability for this stage
                    // only; the run keeps going.
                    if let Err(e) = checkpoints.checkpoint(&ctx.request_id, HashMap::new()).await {
                        warn!(request_id = %ctx.request_id, node = %current, error = %e, "stage checkpoint failed");
                    }
                }
            }

            if self.is_terminal(&current) {
                let state = ctx.store.snapshot(&ctx.request_id).await?;
                if !state.stage.is_terminal() {
                    ctx.store
                        .update_stage(&ctx.request_id, Stage::Completed, HistoryAction::Complete)
                        .await?;
                }
                info!(request_id = %ctx.request_id, node = %current, "graph run finished");
                return Ok(ctx.store.snapshot(&ctx.request_id).await?);
            }

            let state = ctx.store.snapshot(&ctx.request_id).await?;
            let next = self.edges.get(&current).and_then(|edges| {
                edges
                    .iter()
                    .find(|edge| match &edge.predicate {
                        Some(predicate) => predicate(&state),
                        None => true,
                    })
                    .map(|edge| edge.target.clone())
            });

            match next {
                Some(next) => {
                    debug!(request_id = %ctx.request_id, from = %current, to = %next, "edge taken");
                    current = next;
                }
                None => {
                    self.fail_state(ctx, format!("no edge out of '{}' matched", current))
                        .await?;
                    return Err(GraphError::NoMatchingEdge(current));
                }
            }
        }
    }

    fn is_terminal(&self, node: &NodeName) -> bool {
        self.terminals.contains(node)
            || self.edges.get(node).map_or(true, |edges| edges.is_empty())
    }

    async fn apply_update(&self, ctx: &GraphContext, update: NodeUpdate) -> Result<(), GraphError> {
        let NodeUpdate { data, stage, action } = update;
        ctx.store
            .with_state(
                &ctx.request_id,
                action.unwrap_or(HistoryAction::Process),
                move |state| {
                    state.merge_data(data);
                    if let Some(stage) = stage {
                        state.stage = stage;
                    }
                    Ok(())
                },
            )
            .await?;
        Ok(())
    }

    async fn fail_state(
        &self,
        ctx: &GraphContext,
        reason: impl Into<String>,
    ) -> Result<(), GraphError> {
        let reason = reason.into();
        ctx.store
            .with_state(&ctx.request_id, HistoryAction::Fail, move |state| {
                state.fail(reason);
                Ok(())
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::AgentName;
    use crate::domain::graph::{FnNode, NodeFailure};
    use async_trait::async_trait;
    use futures::FutureExt;

    struct SetNode {
        key: &'static str,
        value: serde_json::Value,
    }

    #[async_trait]
    impl Node for SetNode {
        async fn execute(&self, _state: WorkflowState) -> Result<NodeUpdate, NodeFailure> {
            Ok(NodeUpdate::new().with_data(self.key, self.value.clone()))
        }
    }

    struct SlowNode;

    #[async_trait]
    impl Node for SlowNode {
        async fn execute(&self, _state: WorkflowState) -> Result<NodeUpdate, NodeFailure> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(NodeUpdate::new())
        }
    }

    struct FailNode;

    #[async_trait]
    impl Node for FailNode {
        async fn execute(&self, _state: WorkflowState) -> Result<NodeUpdate, NodeFailure> {
            Err(NodeFailure::new("source unreachable"))
        }
    }

    fn context() -> GraphContext {
        let store = Arc::new(SharedStateStore::new());
        let request_id = RequestId::new();
        store
            .create_state(
                request_id,
                "user-1",
                AgentName::new("TwitterSpecialist"),
                HashMap::new(),
            )
            .unwrap();
        GraphContext {
            store,
            request_id,
            cancellation: CancellationToken::new(),
            checkpoints: None,
        }
    }

    #[tokio::test]
    async fn test_linear_graph_runs_to_completion() {
        let graph = GraphBuilder::new(EngineConfig::default())
            .add_node("download", SetNode { key: "file", value: serde_json::json!("v.mp4") })
            .add_node("format", SetNode { key: "formatted", value: serde_json::json!(true) })
            .add_edge("download", "format")
            .set_entry("download")
            .mark_terminal("format")
            .compile()
            .unwrap();

        let ctx = context();
        let final_state = graph.run(&ctx).await.unwrap();

        assert_eq!(final_state.stage, Stage::Completed);
        assert_eq!(final_state.data.get("file"), Some(&serde_json::json!("v.mp4")));
        assert_eq!(final_state.data.get("formatted"), Some(&serde_json::json!(true)));
        // create + download + format + completion
        assert_eq!(final_state.history.len(), 4);
    }

    #[tokio::test]
    async fn test_conditional_edges_route_by_state() {
        let classify = FnNode::new(|_state: WorkflowState| {
            async move { Ok(NodeUpdate::new().with_data("intent", serde_json::json!("media"))) }
                .boxed()
        });

        let graph = GraphBuilder::new(EngineConfig::default())
            .add_node("classify", classify)
            .add_node("media", SetNode { key: "handled_by", value: serde_json::json!("media") })
            .add_node("chat", SetNode { key: "handled_by", value: serde_json::json!("chat") })
            .add_conditional_edge("classify", "media", |state| {
                state.data.get("intent") == Some(&serde_json::json!("media"))
            })
            .add_conditional_edge("classify", "chat", |_| true)
            .set_entry("classify")
            .compile()
            .unwrap();

        let ctx = context();
        let final_state = graph.run(&ctx).await.unwrap();
        assert_eq!(final_state.data.get("handled_by"), Some(&serde_json::json!("media")));
    }

    #[tokio::test]
    async fn test_timeout_routes_to_fallback() {
        let graph = GraphBuilder::new(EngineConfig::default())
            .add_node_with_timeout("slow", SlowNode, Some(Duration::from_millis(50)))
            .add_node("recover", SetNode { key: "recovered", value: serde_json::json!(true) })
            .set_entry("slow")
            .set_fallback("recover")
            .mark_terminal("recover")
            .compile()
            .unwrap();

        let ctx = context();
        let final_state = graph.run(&ctx).await.unwrap();

        assert_eq!(final_state.stage, Stage::Completed);
        assert_eq!(final_state.data.get("recovered"), Some(&serde_json::json!(true)));
        assert!(final_state
            .history
            .iter()
            .any(|entry| entry.action == HistoryAction::Timeout));
    }

    #[tokio::test]
    async fn test_timeout_without_fallback_fails() {
        let graph = GraphBuilder::new(EngineConfig::default())
            .add_node_with_timeout("slow", SlowNode, Some(Duration::from_millis(50)))
            .set_entry("slow")
            .compile()
            .unwrap();

        let ctx = context();
        let result = graph.run(&ctx).await;
        assert!(matches!(result, Err(GraphError::NodeTimeout(_))));

        let state = ctx.store.snapshot(&ctx.request_id).await.unwrap();
        assert_eq!(state.stage, Stage::Failed);
    }

    #[tokio::test]
    async fn test_back_edge_loop_is_bounded() {
        let graph = GraphBuilder::new(EngineConfig {
            max_iterations: 6,
            ..EngineConfig::default()
        })
        .add_node("attempt", SetNode { key: "attempted", value: serde_json::json!(true) })
        .add_node("check", SetNode { key: "checked", value: serde_json::json!(true) })
        .add_edge("attempt", "check")
        // Quality gate that never passes: loop back forever.
        .add_conditional_edge("check", "attempt", |_| true)
        .set_entry("attempt")
        .compile()
        .unwrap();

        let ctx = context();
        let result = graph.run(&ctx).await;
        assert!(matches!(result, Err(GraphError::MaxIterationsExceeded(6))));
    }

    #[tokio::test]
    async fn test_node_failure_is_terminal() {
        let graph = GraphBuilder::new(EngineConfig::default())
            .add_node("broken", FailNode)
            .add_node("after", SetNode { key: "x", value: serde_json::json!(1) })
            .add_edge("broken", "after")
            .set_entry("broken")
            .compile()
            .unwrap();

        let ctx = context();
        let result = graph.run(&ctx).await;
        assert!(matches!(result, Err(GraphError::TerminalFailure { .. })));

        let state = ctx.store.snapshot(&ctx.request_id).await.unwrap();
        assert_eq!(state.stage, Stage::Failed);
        assert_eq!(state.failure_reason.as_deref(), Some("source unreachable"));
    }

    #[tokio::test]
    async fn test_cancellation_stops_scheduling() {
        let graph = GraphBuilder::new(EngineConfig::default())
            .add_node("download", SetNode { key: "file", value: serde_json::json!("v.mp4") })
            .set_entry("download")
            .compile()
            .unwrap();

        let ctx = context();
        ctx.cancellation.cancel();

        let result = graph.run(&ctx).await;
        assert!(matches!(result, Err(GraphError::Cancelled)));

        let state = ctx.store.snapshot(&ctx.request_id).await.unwrap();
        assert_eq!(state.stage, Stage::Failed);
        assert_eq!(state.failure_reason.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_compile_rejects_unknown_entry() {
        let result = GraphBuilder::new(EngineConfig::default())
            .add_node("a", SetNode { key: "x", value: serde_json::json!(1) })
            .set_entry("missing")
            .compile();
        assert!(matches!(result, Err(GraphError::EntryNotFound(_))));
    }

    #[tokio::test]
    async fn test_compile_rejects_dangling_edge() {
        let result = GraphBuilder::new(EngineConfig::default())
            .add_node("a", SetNode { key: "x", value: serde_json::json!(1) })
            .add_edge("a", "missing")
            .set_entry("a")
            .compile();
        assert!(matches!(result, Err(GraphError::EdgeTargetNotFound { .. })));
    }
}
