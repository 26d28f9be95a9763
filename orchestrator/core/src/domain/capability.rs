// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Capability Domain Model
//!
//! Types backing the agent router: agent/capability identifiers, availability
//! status, and the per-`(agent, capability)` scoring record updated after each
//! reported invocation outcome.
//!
//! Scoring is deterministic: the same table and the same requirements always
//! produce the same routing decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of a registered agent (e.g. `"TwitterSpecialist"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentName(String);

impl AgentName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A capability an agent advertises (e.g. `"platform.twitter"`,
/// `"media.transcode"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapabilityType(String);

impl CapabilityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CapabilityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CapabilityType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Available,
    Busy,
    Unavailable,
}

/// Routing preference supplied with a `route()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Balanced,
    /// Re-weight toward low response time.
    Speed,
    /// Re-weight toward success rate.
    Quality,
}

/// Caller requirements for a routing decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default)]
    pub priority: Priority,
}

impl Requirements {
    pub fn speed() -> Self {
        Self { priority: Priority::Speed }
    }

    pub fn quality() -> Self {
        Self { priority: Priority::Quality }
    }
}

// Moving-average factors. Success rate reacts faster than the longer-horizon
// performance score.
const RATE_ALPHA: f64 = 0.3;
const SCORE_ALPHA: f64 = 0.1;

/// Scoring record for one `(agent, capability)` pair.
///
/// Process-wide and shared across all workflows; not persisted across restarts
/// unless exported through the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCapability {
    pub agent: AgentName,
    pub capability: CapabilityType,
    pub performance_score: f64,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    pub status: AgentStatus,
    pub invocations: u64,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,

    pub registered_at: DateTime<Utc>,
}

impl AgentCapability {
    pub fn new(agent: AgentName, capability: CapabilityType) -> Self {
        Self {
            agent,
            capability,
            // Untried agents start mid-score with a clean slate.
            performance_score: 0.5,
            success_rate: 1.0,
            average_response_time_ms: 0.0,
            status: AgentStatus::Available,
            invocations: 0,
            metadata: HashMap::new(),
            registered_at: Utc::now(),
        }
    }

    /// Fold one invocation outcome into the moving averages.
    pub fn record_outcome(&mut self, success: bool, elapsed_ms: f64) {
        let outcome = if success { 1.0 } else { 0.0 };

        if self.invocations == 0 {
            self.average_response_time_ms = elapsed_ms;
        } else {
            self.average_response_time_ms =
                (1.0 - RATE_ALPHA) * self.average_response_time_ms + RATE_ALPHA * elapsed_ms;
        }
        self.success_rate = (1.0 - RATE_ALPHA) * self.success_rate + RATE_ALPHA * outcome;
        self.performance_score = (1.0 - SCORE_ALPHA) * self.performance_score + SCORE_ALPHA * outcome;
        self.invocations += 1;
    }

    /// Deterministic routing score under the given requirements.
    ///
    /// Balanced: `0.4 * performance + 0.4 * success_rate + 0.2 * responsiveness`
    /// where responsiveness is `1 / (1 + avg_response_time_seconds)`.
    pub fn score(&self, requirements: &Requirements) -> f64 {
        let responsiveness = 1.0 / (1.0 + self.average_response_time_ms / 1000.0);

        match requirements.priority {
            Priority::Balanced => {
                0.4 * self.performance_score + 0.4 * self.success_rate + 0.2 * responsiveness
            }
            Priority::Speed => {
                0.2 * self.performance_score + 0.2 * self.success_rate + 0.6 * responsiveness
            }
            Priority::Quality => {
                0.2 * self.performance_score + 0.6 * self.success_rate + 0.2 * responsiveness
            }
        }
    }
}
