// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Team Domain Aggregate
//!
//! A team is the fixed membership behind one swarm: the peer agents, the
//! member that receives control first, and the fallback agent engaged when
//! peers time out or keep rejecting handoffs.
//!
//! # Invariants
//!
//! - Membership is non-empty and fixed for the life of the coordinator.
//! - The default member is part of the membership.

use serde::{Deserialize, Serialize};

use murmuration_core::domain::capability::AgentName;
use murmuration_core::domain::handoff::HandoffError;
use murmuration_core::domain::state::StateError;

/// Unique name for a team (e.g. `"platform"`, `"media"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TeamName(String);

impl TeamName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TeamName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TeamName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Fixed membership of one swarm.
///
/// The fallback agent may be a member or an outside escalation target; it
/// must be registered with the router either way for handoffs toward it to
/// be accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub name: TeamName,
    pub members: Vec<AgentName>,
    pub default_member: AgentName,
    pub fallback: AgentName,
}

impl Team {
    pub fn new(
        name: TeamName,
        members: Vec<AgentName>,
        default_member: AgentName,
        fallback: AgentName,
    ) -> Result<Self, TeamError> {
        if members.is_empty() {
            return Err(TeamError::NoMembers(name));
        }
        if !members.contains(&default_member) {
            return Err(TeamError::DefaultNotMember {
                team: name,
                agent: default_member,
            });
        }
        Ok(Self {
            name,
            members,
            default_member,
            fallback,
        })
    }

    pub fn is_member(&self, agent: &AgentName) -> bool {
        self.members.contains(agent)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TeamError {
    #[error("team '{0}' must have at least one member")]
    NoMembers(TeamName),

    #[error("default member '{agent}' is not part of team '{team}'")]
    DefaultNotMember { team: TeamName, agent: AgentName },
}

/// Successful end of a swarm run.
#[derive(Debug, Clone)]
pub struct SwarmOutcome {
    /// The terminal result returned by the last agent.
    pub result: serde_json::Value,
    /// The agent that produced the terminal result.
    pub handled_by: AgentName,
    /// Whether the fallback agent had to be engaged along the way.
    pub escalated: bool,
    /// Coordinator steps consumed.
    pub steps: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    #[error("agent {agent} failed terminally: {message}")]
    TerminalFailure { agent: AgentName, message: String },

    #[error("agent {0} timed out with no fallback left to try")]
    AgentTimeout(AgentName),

    #[error("run was cancelled")]
    Cancelled,

    #[error("swarm run exceeded its budget of {0} steps")]
    MaxStepsExceeded(u32),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),
}
