// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Supervisor Application Service
//!
//! Top-level hierarchical router. Classifies a request's intent through the
//! external classifier capability, delegates to the matching team's swarm
//! coordinator, and aggregates the final result. When the chosen team fails
//! terminally and a secondary team is configured, the supervisor re-routes
//! the same workflow there before surfacing a structured failure.
//!
//! Callers always receive an [`OrchestrationResult`], never a raw error,
//! with the accumulated processing history attached for diagnostics.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use murmuration_core::application::state_store::SharedStateStore;
use murmuration_core::domain::agent::IntentClassifier;
use murmuration_core::domain::config::EscalationPolicy;
use murmuration_core::domain::events::OrchestrationEvent;
use murmuration_core::domain::state::{HistoryAction, RequestId, Stage};
use murmuration_core::infrastructure::event_bus::EventBus;

use crate::application::coordinator::SwarmCoordinator;
use crate::domain::outcome::{ErrorKind, OrchestrationResult};
use crate::domain::team::SwarmError;

/// A unit of work entering the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestrationRequest {
    /// Caller-supplied id, or `None` to have one generated.
    pub request_id: Option<RequestId>,
    pub user_id: String,
    /// Raw input handed to the intent classifier.
    pub input: String,
    /// Seed data for the workflow's data bag.
    pub data: HashMap<String, serde_json::Value>,
}

impl OrchestrationRequest {
    pub fn new(user_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            request_id: None,
            user_id: user_id.into(),
            input: input.into(),
            data: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Intent label of the team retried against after a terminal primary
    /// failure. No retry happens when unset.
    #[serde(default)]
    pub secondary_team: Option<String>,

    #[serde(default)]
    pub escalation: EscalationPolicy,
}

pub struct Supervisor {
    classifier: Arc<dyn IntentClassifier>,
    store: Arc<SharedStateStore>,
    events: Arc<EventBus>,
    teams: HashMap<String, Arc<SwarmCoordinator>>,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        store: Arc<SharedStateStore>,
        events: Arc<EventBus>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            classifier,
            store,
            events,
            teams: HashMap::new(),
            config,
        }
    }

    /// Register the team handling a given intent label.
    pub fn with_team(
        mut self,
        intent: impl Into<String>,
        coordinator: Arc<SwarmCoordinator>,
    ) -> Self {
        self.teams.insert(intent.into(), coordinator);
        self
    }

    /// Process a request to completion with a fresh cancellation scope.
    pub async fn process(&self, request: OrchestrationRequest) -> OrchestrationResult {
        self.process_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Process a request, observing the caller's cancellation token.
    pub async fn process_with_cancellation(
        &self,
        request: OrchestrationRequest,
        cancellation: CancellationToken,
    ) -> OrchestrationResult {
        let request_id = request.request_id.unwrap_or_default();

        let intent = match self.classifier.classify(&request.input).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(request_id = %request_id, error = %e, "intent classification failed");
                return OrchestrationResult::failure(
                    request_id,
                    ErrorKind::TerminalFailure,
                    e.to_string(),
                    Vec::new(),
                );
            }
        };

        let Some(primary) = self.teams.get(&intent) else {
            warn!(request_id = %request_id, intent = %intent, "no team registered for intent");
            return OrchestrationResult::failure(
                request_id,
                ErrorKind::AgentUnavailable,
                format!("no team registered for intent '{}'", intent),
                Vec::new(),
            );
        };

        let mut data = request.data;
        data.insert("input".to_string(), serde_json::json!(request.input));

        let initial_agent = primary.team().default_member.clone();
        if let Err(e) =
            self.store
                .create_state(request_id, request.user_id, initial_agent.clone(), data)
        {
            return OrchestrationResult::failure(
                request_id,
                ErrorKind::AlreadyExists,
                e.to_string(),
                Vec::new(),
            );
        }

        info!(request_id = %request_id, intent = %intent, team = %primary.team().name, "request accepted");
        self.events.publish(OrchestrationEvent::RequestCreated {
            request_id,
            agent: initial_agent,
            timestamp: chrono::Utc::now(),
        });

        let mut team = primary.clone();
        let mut team_label = intent;
        let mut retries: u32 = 0;

        loop {
            match team.run(request_id, cancellation.clone()).await {
                Ok(_outcome) => {
                    let state = match self.store.snapshot(&request_id).await {
                        Ok(state) => state,
                        Err(e) => {
                            return OrchestrationResult::failure(
                                request_id,
                                ErrorKind::NotFound,
                                e.to_string(),
                                Vec::new(),
                            )
                        }
                    };

                    self.events.publish(OrchestrationEvent::RequestCompleted {
                        request_id,
                        success: true,
                    });
                    return OrchestrationResult::success(request_id, state.data, state.history);
                }

                Err(e) => {
                    if self.retriable(&e) && retries < self.config.escalation.max_team_retries {
                        if let Some((label, secondary)) = self.secondary_team(&team_label) {
                            retries += 1;
                            warn!(
                                request_id = %request_id,
                                error = %e,
                                secondary = %label,
                                retry = retries,
                                "primary team failed, retrying against secondary"
                            );

                            if let Some(backoff) = self.config.escalation.backoff {
                                tokio::time::sleep(backoff).await;
                            }

                            let default_member = secondary.team().default_member.clone();
                            let rerouted = self
                                .store
                                .with_state(&request_id, HistoryAction::Route, move |state| {
                                    state.current_agent = default_member;
                                    state.stage = Stage::Routed;
                                    Ok(())
                                })
                                .await;

                            if rerouted.is_ok() {
                                team = secondary;
                                team_label = label;
                                continue;
                            }
                        }
                    }

                    return self.surface_failure(request_id, &e).await;
                }
            }
        }
    }

    fn retriable(&self, error: &SwarmError) -> bool {
        matches!(
            error,
            SwarmError::TerminalFailure { .. }
                | SwarmError::AgentTimeout(_)
                | SwarmError::MaxStepsExceeded(_)
        )
    }

    /// The configured secondary team, unless it is the team that just
    /// failed.
    fn secondary_team(&self, failed_label: &str) -> Option<(String, Arc<SwarmCoordinator>)> {
        let label = self.config.secondary_team.as_ref()?;
        if label == failed_label {
            return None;
        }
        let coordinator = self.teams.get(label)?;
        Some((label.clone(), coordinator.clone()))
    }

    /// Mark the workflow failed and build the structured error result.
    async fn surface_failure(
        &self,
        request_id: RequestId,
        error: &SwarmError,
    ) -> OrchestrationResult {
        let message = error.to_string();
        let kind = match error {
            SwarmError::TerminalFailure { .. } | SwarmError::MaxStepsExceeded(_) => {
                ErrorKind::TerminalFailure
            }
            SwarmError::AgentTimeout(_) => ErrorKind::NodeTimeout,
            SwarmError::Cancelled => ErrorKind::Cancelled,
            SwarmError::State(_) => ErrorKind::NotFound,
            SwarmError::Handoff(_) => ErrorKind::TerminalFailure,
        };

        let final_mark = {
            let message = message.clone();
            self.store
                .with_state(&request_id, HistoryAction::Fail, move |state| {
                    state.fail(message);
                    Ok(())
                })
                .await
        };
        if let Err(e) = final_mark {
            warn!(request_id = %request_id, error = %e, "could not mark workflow failed");
        }

        let history = match self.store.snapshot(&request_id).await {
            Ok(state) => state.history,
            Err(_) => Vec::new(),
        };

        self.events.publish(OrchestrationEvent::RequestCompleted {
            request_id,
            success: false,
        });
        OrchestrationResult::failure(request_id, kind, message, history)
    }
}
