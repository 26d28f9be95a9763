// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Swarm Coordinator Application Service
//!
//! Runs one team of peer agents for a single request. Each step invokes the
//! agent currently holding control; the agent either returns a terminal
//! result (the coordinator returns it up) or requests a handoff to a peer,
//! which the handoff manager validates. After a configurable number of
//! consecutive rejections, or an invocation timeout, control escalates to
//! the team's fallback agent.
//!
//! State machine per run:
//!
//! ```text
//! Idle -> Active(agent) -> { Active(other) via handoff | Terminal | Escalated }
//! ```
//!
//! The coordinator records failures in history but leaves the final
//! `Failed` stage marking to the supervisor, which may still retry the
//! request against a secondary team.

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use murmuration_core::application::checkpoint::CheckpointManager;
use murmuration_core::application::handoff_manager::HandoffManager;
use murmuration_core::application::state_store::SharedStateStore;
use murmuration_core::domain::agent::{AgentInvoker, AgentReply, InvocationContext};
use murmuration_core::domain::config::SwarmConfig;
use murmuration_core::domain::events::OrchestrationEvent;
use murmuration_core::domain::state::{HistoryAction, RequestId, Stage};
use murmuration_core::infrastructure::event_bus::EventBus;

use crate::domain::team::{SwarmError, SwarmOutcome, Team};

pub struct SwarmCoordinator {
    team: Team,
    invoker: Arc<dyn AgentInvoker>,
    store: Arc<SharedStateStore>,
    handoffs: Arc<HandoffManager>,
    checkpoints: Option<Arc<CheckpointManager>>,
    events: Arc<EventBus>,
    config: SwarmConfig,
}

impl SwarmCoordinator {
    pub fn new(
        team: Team,
        invoker: Arc<dyn AgentInvoker>,
        store: Arc<SharedStateStore>,
        handoffs: Arc<HandoffManager>,
        checkpoints: Option<Arc<CheckpointManager>>,
        events: Arc<EventBus>,
        config: SwarmConfig,
    ) -> Self {
        Self {
            team,
            invoker,
            store,
            handoffs,
            checkpoints,
            events,
            config,
        }
    }

    pub fn team(&self) -> &Team {
        &self.team
    }

    /// Drive the request through this swarm until an agent returns a
    /// terminal result.
    ///
    /// The workflow state for `request_id` must already exist. When the
    /// current agent is not a team member (e.g. the request was retried from
    /// another team), control is first routed to the default member.
    pub async fn run(
        &self,
        request_id: RequestId,
        cancellation: CancellationToken,
    ) -> Result<SwarmOutcome, SwarmError> {
        self.route_in(&request_id).await?;

        let mut consecutive_rejections: u32 = 0;
        let mut escalated = false;
        let mut steps: u32 = 0;

        loop {
            if cancellation.is_cancelled() {
                self.store
                    .with_state(&request_id, HistoryAction::Fail, |state| {
                        state.fail("cancelled");
                        Ok(())
                    })
                    .await?;
                return Err(SwarmError::Cancelled);
            }

            steps += 1;
            if steps > self.config.max_steps {
                self.store
                    .append_history(&request_id, HistoryAction::Fail)
                    .await?;
                return Err(SwarmError::MaxStepsExceeded(self.config.max_steps));
            }

            let state = self.store.snapshot(&request_id).await?;
            let agent = state.current_agent.clone();
            debug!(request_id = %request_id, agent = %agent, step = steps, "invoking agent");

            let ctx = InvocationContext {
                request_id,
                agent: agent.clone(),
                data: state.data.clone(),
                cancellation: cancellation.clone(),
            };

            let invocation =
                tokio::time::timeout(self.config.invoke_timeout, self.invoker.invoke(&agent, ctx))
                    .await;

            let reply = match invocation {
                Ok(reply) => reply,
                Err(_) => {
                    warn!(request_id = %request_id, agent = %agent, "agent invocation timed out");
                    if agent == self.team.fallback {
                        self.store
                            .append_history(&request_id, HistoryAction::Timeout)
                            .await?;
                        return Err(SwarmError::AgentTimeout(agent));
                    }
                    self.escalate(&request_id, HistoryAction::Timeout).await?;
                    escalated = true;
                    consecutive_rejections = 0;
                    continue;
                }
            };

            let reply = match reply {
                Ok(reply) => reply,
                Err(e) => {
                    let message = e.to_string();
                    warn!(request_id = %request_id, agent = %agent, error = %message, "agent failed");
                    self.store
                        .append_history(&request_id, HistoryAction::Fail)
                        .await?;
                    return Err(SwarmError::TerminalFailure { agent, message });
                }
            };

            match reply {
                AgentReply::Complete { result } => {
                    self.checkpoint(&request_id, "pre-completion").await;

                    let recorded = result.clone();
                    self.store
                        .with_state(&request_id, HistoryAction::Complete, move |state| {
                            state.data.insert("result".to_string(), recorded);
                            state.stage = Stage::Completed;
                            Ok(())
                        })
                        .await?;

                    info!(request_id = %request_id, agent = %agent, steps, "swarm run completed");
                    return Ok(SwarmOutcome {
                        result,
                        handled_by: agent,
                        escalated,
                        steps,
                    });
                }

                AgentReply::Handoff { to, reason, context } => {
                    let outcome = self
                        .handoffs
                        .request_handoff(request_id, agent.clone(), to.clone(), context, reason)
                        .await?;

                    if outcome.is_accepted() {
                        consecutive_rejections = 0;
                        self.checkpoint(&request_id, "post-handoff").await;
                        continue;
                    }

                    consecutive_rejections += 1;
                    debug!(
                        request_id = %request_id,
                        from = %agent,
                        to = %to,
                        consecutive_rejections,
                        "handoff rejected"
                    );

                    if consecutive_rejections >= self.config.max_consecutive_rejections {
                        if agent == self.team.fallback {
                            self.store
                                .append_history(&request_id, HistoryAction::Fail)
                                .await?;
                            return Err(SwarmError::TerminalFailure {
                                agent,
                                message: "fallback agent exhausted its handoff attempts"
                                    .to_string(),
                            });
                        }
                        self.escalate(&request_id, HistoryAction::Escalate).await?;
                        escalated = true;
                        consecutive_rejections = 0;
                    }
                }
            }
        }
    }

    /// Point control at the default member unless a team member already
    /// holds it.
    async fn route_in(&self, request_id: &RequestId) -> Result<(), SwarmError> {
        let state = self.store.snapshot(request_id).await?;
        if self.team.is_member(&state.current_agent) {
            return Ok(());
        }

        let default_member = self.team.default_member.clone();
        info!(request_id = %request_id, team = %self.team.name, agent = %default_member, "routing into team");
        self.store
            .with_state(request_id, HistoryAction::Route, move |state| {
                state.current_agent = default_member;
                state.stage = Stage::Routed;
                Ok(())
            })
            .await?;

        self.checkpoint(request_id, "post-routing").await;
        Ok(())
    }

    /// Hand control to the fallback agent, recording `action` in history.
    async fn escalate(
        &self,
        request_id: &RequestId,
        action: HistoryAction,
    ) -> Result<(), SwarmError> {
        let fallback = self.team.fallback.clone();
        warn!(request_id = %request_id, team = %self.team.name, fallback = %fallback, "escalating to fallback agent");

        self.store
            .with_state(request_id, action, {
                let fallback = fallback.clone();
                move |state| {
                    state.current_agent = fallback;
                    state.stage = Stage::Processing;
                    Ok(())
                }
            })
            .await?;

        self.events.publish(OrchestrationEvent::Escalated {
            request_id: *request_id,
            team: self.team.name.as_str().to_string(),
            fallback,
        });
        Ok(())
    }

    /// Best-effort stage-boundary checkpoint. A write failure downgrades
    /// durability for the stage but never aborts the run.
    async fn checkpoint(&self, request_id: &RequestId, boundary: &str) {
        if let Some(checkpoints) = &self.checkpoints {
            let metadata = HashMap::from([(
                "boundary".to_string(),
                serde_json::Value::String(boundary.to_string()),
            )]);
            if let Err(e) = checkpoints.checkpoint(request_id, metadata).await {
                warn!(request_id = %request_id, boundary, error = %e, "stage checkpoint failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use murmuration_core::application::router::AgentRouter;
    use murmuration_core::domain::agent::InvokeError;
    use murmuration_core::domain::capability::{AgentName, CapabilityType};
    use murmuration_core::domain::config::HandoffConfig;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Scripted invoker: pops the next reply for each agent in order.
    struct ScriptedInvoker {
        replies: Mutex<HashMap<AgentName, VecDeque<Result<AgentReply, InvokeError>>>>,
    }

    impl ScriptedInvoker {
        fn new() -> Self {
            Self {
                replies: Mutex::new(HashMap::new()),
            }
        }

        async fn script(&self, agent: &str, reply: Result<AgentReply, InvokeError>) {
            self.replies
                .lock()
                .await
                .entry(AgentName::new(agent))
                .or_default()
                .push_back(reply);
        }
    }

    #[async_trait]
    impl AgentInvoker for ScriptedInvoker {
        async fn invoke(
            &self,
            agent: &AgentName,
            _ctx: InvocationContext,
        ) -> Result<AgentReply, InvokeError> {
            self.replies
                .lock()
                .await
                .get_mut(agent)
                .and_then(|queue| queue.pop_front())
                .unwrap_or(Err(InvokeError::Unavailable(agent.clone())))
        }
    }

    /// Invoker that never answers, to exercise timeouts.
    struct StalledInvoker;

    #[async_trait]
    impl AgentInvoker for StalledInvoker {
        async fn invoke(
            &self,
            _agent: &AgentName,
            _ctx: InvocationContext,
        ) -> Result<AgentReply, InvokeError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(AgentReply::Complete {
                result: serde_json::json!(null),
            })
        }
    }

    struct Fixture {
        store: Arc<SharedStateStore>,
        router: Arc<AgentRouter>,
        handoffs: Arc<HandoffManager>,
        events: Arc<EventBus>,
        request_id: RequestId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(SharedStateStore::new());
        let router = Arc::new(AgentRouter::new());
        for agent in [
            "TwitterSpecialist",
            "TikTokSpecialist",
            "MediaCoordinator",
            "GeneralistAgent",
        ] {
            router.register(
                AgentName::new(agent),
                vec![CapabilityType::new("platform")],
                HashMap::new(),
            );
        }
        let events = Arc::new(EventBus::with_default_capacity());
        let handoffs = Arc::new(HandoffManager::new(
            store.clone(),
            router.clone(),
            events.clone(),
            HandoffConfig::default(),
        ));

        let request_id = RequestId::new();
        store
            .create_state(
                request_id,
                "user-1",
                AgentName::new("TwitterSpecialist"),
                HashMap::new(),
            )
            .unwrap();

        Fixture {
            store,
            router,
            handoffs,
            events,
            request_id,
        }
    }

    fn platform_team() -> Team {
        Team::new(
            crate::domain::team::TeamName::new("platform"),
            vec![
                AgentName::new("TwitterSpecialist"),
                AgentName::new("TikTokSpecialist"),
                AgentName::new("MediaCoordinator"),
            ],
            AgentName::new("TwitterSpecialist"),
            AgentName::new("GeneralistAgent"),
        )
        .unwrap()
    }

    fn coordinator(fx: &Fixture, invoker: Arc<dyn AgentInvoker>, config: SwarmConfig) -> SwarmCoordinator {
        SwarmCoordinator::new(
            platform_team(),
            invoker,
            fx.store.clone(),
            fx.handoffs.clone(),
            None,
            fx.events.clone(),
            config,
        )
    }

    #[tokio::test]
    async fn test_handoff_then_completion() {
        let fx = fixture();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker
            .script(
                "TwitterSpecialist",
                Ok(AgentReply::Handoff {
                    to: AgentName::new("MediaCoordinator"),
                    reason: "video attached".to_string(),
                    context: HashMap::from([(
                        "media_url".to_string(),
                        serde_json::json!("https://x.com/v.mp4"),
                    )]),
                }),
            )
            .await;
        invoker
            .script(
                "MediaCoordinator",
                Ok(AgentReply::Complete {
                    result: serde_json::json!({"file": "v.mp4"}),
                }),
            )
            .await;

        let coordinator = coordinator(&fx, invoker, SwarmConfig::default());
        let outcome = coordinator
            .run(fx.request_id, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.handled_by, AgentName::new("MediaCoordinator"));
        assert!(!outcome.escalated);

        let state = fx.store.snapshot(&fx.request_id).await.unwrap();
        assert_eq!(state.stage, Stage::Completed);
        // create + handoff + complete, nothing else
        assert_eq!(state.history.len(), 3);
        assert_eq!(state.history[0].action, HistoryAction::Create);
        assert_eq!(state.history[1].action, HistoryAction::Handoff);
        assert_eq!(state.history[2].action, HistoryAction::Complete);
        assert_eq!(
            state.data.get("media_url"),
            Some(&serde_json::json!("https://x.com/v.mp4"))
        );
    }

    #[tokio::test]
    async fn test_consecutive_rejections_escalate_to_fallback() {
        let fx = fixture();
        // TikTokSpecialist is offline, so every handoff toward it is
        // rejected.
        fx.router
            .set_status(&AgentName::new("TikTokSpecialist"), murmuration_core::domain::capability::AgentStatus::Unavailable);

        let invoker = Arc::new(ScriptedInvoker::new());
        for _ in 0..3 {
            invoker
                .script(
                    "TwitterSpecialist",
                    Ok(AgentReply::Handoff {
                        to: AgentName::new("TikTokSpecialist"),
                        reason: "cross-post".to_string(),
                        context: HashMap::new(),
                    }),
                )
                .await;
        }
        invoker
            .script(
                "GeneralistAgent",
                Ok(AgentReply::Complete {
                    result: serde_json::json!("handled generically"),
                }),
            )
            .await;

        let coordinator = coordinator(&fx, invoker, SwarmConfig::default());
        let outcome = coordinator
            .run(fx.request_id, CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.escalated);
        assert_eq!(outcome.handled_by, AgentName::new("GeneralistAgent"));

        let state = fx.store.snapshot(&fx.request_id).await.unwrap();
        assert!(state
            .history
            .iter()
            .any(|entry| entry.action == HistoryAction::Escalate));
    }

    #[tokio::test]
    async fn test_timeout_routes_to_fallback() {
        let fx = fixture();
        // First step stalls; after escalation the fallback completes. The
        // scripted invoker would answer instantly, so stall by scripting
        // nothing for TwitterSpecialist and using a stalled invoker instead.
        struct SplitInvoker {
            stalled: StalledInvoker,
            scripted: ScriptedInvoker,
        }

        #[async_trait]
        impl AgentInvoker for SplitInvoker {
            async fn invoke(
                &self,
                agent: &AgentName,
                ctx: InvocationContext,
            ) -> Result<AgentReply, InvokeError> {
                if agent.as_str() == "TwitterSpecialist" {
                    self.stalled.invoke(agent, ctx).await
                } else {
                    self.scripted.invoke(agent, ctx).await
                }
            }
        }

        let scripted = ScriptedInvoker::new();
        scripted
            .script(
                "GeneralistAgent",
                Ok(AgentReply::Complete {
                    result: serde_json::json!("recovered"),
                }),
            )
            .await;
        let invoker = Arc::new(SplitInvoker {
            stalled: StalledInvoker,
            scripted,
        });

        let config = SwarmConfig {
            invoke_timeout: Duration::from_millis(50),
            ..SwarmConfig::default()
        };
        let coordinator = coordinator(&fx, invoker, config);
        let outcome = coordinator
            .run(fx.request_id, CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.escalated);
        assert_eq!(outcome.handled_by, AgentName::new("GeneralistAgent"));

        let state = fx.store.snapshot(&fx.request_id).await.unwrap();
        assert_eq!(state.stage, Stage::Completed);
        assert!(state
            .history
            .iter()
            .any(|entry| entry.action == HistoryAction::Timeout));
    }

    #[tokio::test]
    async fn test_agent_error_is_terminal_without_failed_stage() {
        let fx = fixture();
        let invoker = Arc::new(ScriptedInvoker::new());
        invoker
            .script(
                "TwitterSpecialist",
                Err(InvokeError::Failed("tweet deleted".to_string())),
            )
            .await;

        let coordinator = coordinator(&fx, invoker, SwarmConfig::default());
        let result = coordinator.run(fx.request_id, CancellationToken::new()).await;

        assert!(matches!(result, Err(SwarmError::TerminalFailure { .. })));

        // The supervisor decides whether this is final; the stage is not yet
        // Failed so a secondary team can still take over.
        let state = fx.store.snapshot(&fx.request_id).await.unwrap();
        assert_ne!(state.stage, Stage::Failed);
        assert!(state
            .history
            .iter()
            .any(|entry| entry.action == HistoryAction::Fail));
    }

    #[tokio::test]
    async fn test_cancellation_marks_state_failed() {
        let fx = fixture();
        let invoker = Arc::new(ScriptedInvoker::new());
        let coordinator = coordinator(&fx, invoker, SwarmConfig::default());

        let token = CancellationToken::new();
        token.cancel();
        let result = coordinator.run(fx.request_id, token).await;

        assert!(matches!(result, Err(SwarmError::Cancelled)));
        let state = fx.store.snapshot(&fx.request_id).await.unwrap();
        assert_eq!(state.stage, Stage::Failed);
        assert_eq!(state.failure_reason.as_deref(), Some("cancelled"));
    }

    #[tokio::test]
    async fn test_step_budget_bounds_the_run() {
        let fx = fixture();
        let invoker = Arc::new(ScriptedInvoker::new());
        // Endless forward handoffs between two members.
        for i in 0..20 {
            let (from, to) = if i % 2 == 0 {
                ("TwitterSpecialist", "MediaCoordinator")
            } else {
                ("MediaCoordinator", "TwitterSpecialist")
            };
            invoker
                .script(
                    from,
                    Ok(AgentReply::Handoff {
                        to: AgentName::new(to),
                        reason: "ping".to_string(),
                        context: HashMap::new(),
                    }),
                )
                .await;
        }

        let config = SwarmConfig {
            max_steps: 4,
            max_consecutive_rejections: 100,
            ..SwarmConfig::default()
        };
        let coordinator = coordinator(&fx, invoker, config);
        let result = coordinator.run(fx.request_id, CancellationToken::new()).await;

        assert!(matches!(result, Err(SwarmError::MaxStepsExceeded(4))));
    }

    #[tokio::test]
    async fn test_routes_to_default_member_when_control_is_outside_team() {
        let fx = fixture();
        // Re-point control at an agent outside the team before running.
        fx.store
            .with_state(&fx.request_id, HistoryAction::Process, |state| {
                state.current_agent = AgentName::new("GeneralistAgent");
                Ok(())
            })
            .await
            .unwrap();

        let invoker = Arc::new(ScriptedInvoker::new());
        invoker
            .script(
                "TwitterSpecialist",
                Ok(AgentReply::Complete {
                    result: serde_json::json!("done"),
                }),
            )
            .await;

        let coordinator = coordinator(&fx, invoker, SwarmConfig::default());
        let outcome = coordinator
            .run(fx.request_id, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.handled_by, AgentName::new("TwitterSpecialist"));
        let state = fx.store.snapshot(&fx.request_id).await.unwrap();
        assert!(state
            .history
            .iter()
            .any(|entry| entry.action == HistoryAction::Route));
    }
}
