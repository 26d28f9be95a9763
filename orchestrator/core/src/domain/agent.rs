// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! External Agent Capability Seams
//!
//! The core treats agents as opaque: an agent consumes an invocation context
//! and returns either a terminal result or a handoff request. The concrete
//! specialists (platform downloaders, content analyzers, transcoders) live
//! outside this crate and plug in through [`AgentInvoker`]; intent
//! classification plugs in through [`IntentClassifier`].

use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::domain::capability::AgentName;
use crate::domain::state::RequestId;

/// Everything an agent gets to see for one invocation.
///
/// `cancellation` must be honored by long-running invocations; the core stops
/// scheduling further work once the token is cancelled but does not forcibly
/// interrupt an in-flight call.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub request_id: RequestId,
    pub agent: AgentName,
    pub data: HashMap<String, serde_json::Value>,
    pub cancellation: CancellationToken,
}

/// What an agent invocation produced.
#[derive(Debug, Clone)]
pub enum AgentReply {
    /// The agent finished its part of the work.
    Complete { result: serde_json::Value },

    /// The agent wants to transfer control to a peer.
    Handoff {
        to: AgentName,
        reason: String,
        context: HashMap<String, serde_json::Value>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    #[error("agent {0} is not available")]
    Unavailable(AgentName),

    #[error("agent invocation failed: {0}")]
    Failed(String),
}

/// Consumed capability: invoke an agent with context, get a result or a
/// handoff request back.
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    async fn invoke(
        &self,
        agent: &AgentName,
        ctx: InvocationContext,
    ) -> Result<AgentReply, InvokeError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("intent classification failed: {0}")]
    Failed(String),
}

/// Consumed capability: map a raw request input to an intent label the
/// supervisor uses for team selection. Opaque to the core.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, input: &str) -> Result<String, ClassifyError>;
}
