// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Orchestration Configuration
//!
//! Serde-deserializable tunables for the coordination substrate. Every knob
//! has a default so hosts can construct configs with `..Default::default()`
//! or deserialize partial manifests.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Handoff manager tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffConfig {
    /// Sliding-window size for cycle detection: a handoff is rejected when its
    /// target appears as a sender within the last `cycle_window` handoff
    /// requests for the same workflow.
    #[serde(default = "default_cycle_window")]
    pub cycle_window: usize,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            cycle_window: default_cycle_window(),
        }
    }
}

fn default_cycle_window() -> usize {
    5
}

/// Checkpoint manager tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// How many checkpoints `prune_default` retains per request, oldest
    /// pruned first.
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            keep_last: default_keep_last(),
        }
    }
}

fn default_keep_last() -> usize {
    3
}

/// Swarm coordinator tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Consecutive handoff rejections tolerated before escalating to the
    /// team's fallback agent.
    #[serde(default = "default_max_consecutive_rejections")]
    pub max_consecutive_rejections: u32,

    /// Timeout applied to each agent invocation.
    #[serde(default = "default_invoke_timeout", with = "humantime_serde")]
    pub invoke_timeout: Duration,

    /// Upper bound on coordinator steps for one run; trips the run into a
    /// terminal failure instead of looping forever.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            max_consecutive_rejections: default_max_consecutive_rejections(),
            invoke_timeout: default_invoke_timeout(),
            max_steps: default_max_steps(),
        }
    }
}

fn default_max_consecutive_rejections() -> u32 {
    3
}

fn default_invoke_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_steps() -> u32 {
    12
}

/// Graph engine tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard bound on node executions per run; conditional back-edges (retry
    /// loops) count against it.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Timeout applied to nodes that do not declare their own.
    #[serde(default, with = "humantime_serde")]
    pub default_node_timeout: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            default_node_timeout: None,
        }
    }
}

fn default_max_iterations() -> u32 {
    25
}

/// Retry policy applied when a team fails terminally and a secondary team is
/// configured. Quantitative parameters are deliberately host-supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Additional attempts against the secondary team (0 disables retry).
    #[serde(default = "default_max_team_retries")]
    pub max_team_retries: u32,

    /// Optional pause before each retry.
    #[serde(default, with = "humantime_serde")]
    pub backoff: Option<Duration>,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            max_team_retries: default_max_team_retries(),
            backoff: None,
        }
    }
}

fn default_max_team_retries() -> u32 {
    1
}
