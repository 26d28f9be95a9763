// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Router Application Service
//!
//! Process-wide registry of agents and their advertised capabilities, with
//! scored, deterministic selection. The capability table is shared across all
//! workflows; outcome reporting from concurrent requests is atomic per
//! `(agent, capability)` entry under the table lock.
//!
//! Lifecycle is explicit: hosts `register` agents at startup and may
//! `deregister` them at teardown; there is no implicit singleton.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::capability::{
    AgentCapability, AgentName, AgentStatus, CapabilityType, Requirements,
};

#[derive(Default)]
pub struct AgentRouter {
    table: RwLock<HashMap<AgentName, HashMap<CapabilityType, AgentCapability>>>,
}

impl AgentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or update an agent's entry. Capabilities already registered keep
    /// their accumulated statistics; new ones start fresh. Registration marks
    /// the agent `Available`.
    pub fn register(
        &self,
        agent: AgentName,
        capabilities: Vec<CapabilityType>,
        metadata: HashMap<String, serde_json::Value>,
    ) {
        let mut table = self.table.write();
        let entry = table.entry(agent.clone()).or_default();

        for capability in capabilities {
            let record = entry
                .entry(capability.clone())
                .or_insert_with(|| AgentCapability::new(agent.clone(), capability));
            record.status = AgentStatus::Available;
            record.metadata = metadata.clone();
        }
        debug!(agent = %agent, "agent registered");
    }

    /// Remove an agent and all of its capability entries.
    pub fn deregister(&self, agent: &AgentName) {
        self.table.write().remove(agent);
        debug!(agent = %agent, "agent deregistered");
    }

    /// Set the availability status on every capability the agent advertises.
    pub fn set_status(&self, agent: &AgentName, status: AgentStatus) {
        let mut table = self.table.write();
        if let Some(capabilities) = table.get_mut(agent) {
            for record in capabilities.values_mut() {
                record.status = status;
            }
        }
    }

    /// Whether the agent is registered and available on at least one
    /// capability.
    pub fn is_available(&self, agent: &AgentName) -> bool {
        self.table
            .read()
            .get(agent)
            .map(|capabilities| {
                capabilities
                    .values()
                    .any(|record| record.status == AgentStatus::Available)
            })
            .unwrap_or(false)
    }

    /// Pick the best available agent for a capability.
    ///
    /// Candidates are scored per [`AgentCapability::score`]; ties break on
    /// agent name so the decision is reproducible given the same table.
    /// Returns `None` when no available agent advertises the capability.
    pub fn route(
        &self,
        capability: &CapabilityType,
        requirements: &Requirements,
    ) -> Option<AgentName> {
        let table = self.table.read();

        let mut best: Option<(f64, &AgentName)> = None;
        for (agent, capabilities) in table.iter() {
            let Some(record) = capabilities.get(capability) else {
                continue;
            };
            if record.status != AgentStatus::Available {
                continue;
            }

            let score = record.score(requirements);
            let better = match best {
                None => true,
                Some((best_score, best_agent)) => {
                    score > best_score || (score == best_score && agent < best_agent)
                }
            };
            if better {
                best = Some((score, agent));
            }
        }

        match best {
            Some((score, agent)) => {
                debug!(capability = %capability, agent = %agent, score, "routed");
                Some(agent.clone())
            }
            None => {
                warn!(capability = %capability, "no available agent for capability");
                None
            }
        }
    }

    /// Fold an invocation outcome into the agent's moving averages. Unknown
    /// pairs are ignored (the agent may have been deregistered mid-flight).
    pub fn report_outcome(
        &self,
        agent: &AgentName,
        capability: &CapabilityType,
        success: bool,
        elapsed: Duration,
    ) {
        let mut table = self.table.write();
        if let Some(record) = table
            .get_mut(agent)
            .and_then(|capabilities| capabilities.get_mut(capability))
        {
            record.record_outcome(success, elapsed.as_secs_f64() * 1000.0);
        }
    }

    /// Clone of one capability record, mainly for inspection and tests.
    pub fn capability(
        &self,
        agent: &AgentName,
        capability: &CapabilityType,
    ) -> Option<AgentCapability> {
        self.table
            .read()
            .get(agent)
            .and_then(|capabilities| capabilities.get(capability))
            .cloned()
    }

    /// Snapshot of the whole table, e.g. for persisting scores across a
    /// planned restart.
    pub fn export_table(&self) -> Vec<AgentCapability> {
        let mut records: Vec<AgentCapability> = self
            .table
            .read()
            .values()
            .flat_map(|capabilities| capabilities.values().cloned())
            .collect();
        records.sort_by(|a, b| (&a.agent, &a.capability).cmp(&(&b.agent, &b.capability)));
        records
    }

    /// Load a previously exported table, replacing entries for the same
    /// `(agent, capability)` pairs.
    pub fn import_table(&self, records: Vec<AgentCapability>) {
        let mut table = self.table.write();
        for record in records {
            table
                .entry(record.agent.clone())
                .or_default()
                .insert(record.capability.clone(), record);
        }
    }
}
