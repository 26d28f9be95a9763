// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Checkpoint Manager Application Service
//!
//! Persists point-in-time snapshots of workflow state and restores them for
//! fault recovery. Snapshots are read under the shared state store's lock and
//! never append history; checkpointing is invisible to the mutation log.
//!
//! Checkpoints are taken at stage boundaries (post-routing, post-handoff,
//! pre-completion) rather than on every mutation, bounding overhead. A
//! persistence failure surfaces as `WriteFailed`; the calling stage is then
//! non-durable and the caller decides whether to retry or proceed.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::state_store::SharedStateStore;
use crate::domain::checkpoint::{Checkpoint, CheckpointError, CheckpointId, CheckpointStore};
use crate::domain::config::CheckpointConfig;
use crate::domain::events::OrchestrationEvent;
use crate::domain::state::{HistoryAction, RequestId, Stage, WorkflowState};
use crate::infrastructure::event_bus::EventBus;

pub struct CheckpointManager {
    store: Arc<SharedStateStore>,
    backend: Arc<dyn CheckpointStore>,
    events: Arc<EventBus>,
    config: CheckpointConfig,
}

impl CheckpointManager {
    pub fn new(
        store: Arc<SharedStateStore>,
        backend: Arc<dyn CheckpointStore>,
        events: Arc<EventBus>,
        config: CheckpointConfig,
    ) -> Self {
        Self {
            store,
            backend,
            events,
            config,
        }
    }

    /// Snapshot the workflow's current state and persist it.
    pub async fn checkpoint(
        &self,
        request_id: &RequestId,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<CheckpointId, CheckpointError> {
        let state = self.store.snapshot(request_id).await?;

        let checkpoint = Checkpoint::capture(state, metadata);
        let checkpoint_id = checkpoint.checkpoint_id;
        let stage = checkpoint.stage;

        if let Err(e) = self.backend.put(&checkpoint).await {
            warn!(request_id = %request_id, error = %e, "checkpoint write failed");
            return Err(e);
        }

        debug!(request_id = %request_id, checkpoint_id = %checkpoint_id, stage = %stage, "checkpoint written");
        self.events.publish(OrchestrationEvent::CheckpointWritten {
            request_id: *request_id,
            checkpoint_id,
            stage,
        });

        Ok(checkpoint_id)
    }

    /// Load one checkpoint's state by id.
    pub async fn restore(&self, id: &CheckpointId) -> Result<WorkflowState, CheckpointError> {
        let checkpoint = self
            .backend
            .get(id)
            .await?
            .ok_or(CheckpointError::NotFound(*id))?;
        Ok(checkpoint.state)
    }

    /// State captured by the most recent checkpoint for the request, if any.
    pub async fn latest(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<WorkflowState>, CheckpointError> {
        Ok(self
            .latest_checkpoint(request_id)
            .await?
            .map(|checkpoint| checkpoint.state))
    }

    /// Remove all but the `keep_last` most recent checkpoints for a request.
    pub async fn prune(
        &self,
        request_id: &RequestId,
        keep_last: usize,
    ) -> Result<(), CheckpointError> {
        let mut checkpoints = self.sorted_for_request(request_id).await?;

        let excess = checkpoints.len().saturating_sub(keep_last);
        for checkpoint in checkpoints.drain(..excess) {
            self.backend.delete(&checkpoint.checkpoint_id).await?;
            debug!(
                request_id = %request_id,
                checkpoint_id = %checkpoint.checkpoint_id,
                "checkpoint pruned"
            );
        }
        Ok(())
    }

    /// `prune` with the configured retention count.
    pub async fn prune_default(&self, request_id: &RequestId) -> Result<(), CheckpointError> {
        self.prune(request_id, self.config.keep_last).await
    }

    /// Recovery entry point: reinstall the most recent checkpoint into the
    /// shared state store so the workflow can re-enter the graph at its
    /// checkpointed stage. Marks the state `Checkpointed` with a history
    /// entry, so a resumed run is distinguishable in the audit trail.
    pub async fn resume(&self, request_id: &RequestId) -> Result<WorkflowState, CheckpointError> {
        let checkpoint = self
            .latest_checkpoint(request_id)
            .await?
            .ok_or(CheckpointError::NothingToRestore(*request_id))?;

        info!(
            request_id = %request_id,
            checkpoint_id = %checkpoint.checkpoint_id,
            stage = %checkpoint.stage,
            "resuming from checkpoint"
        );

        self.store.restore(checkpoint.state.clone());
        self.store
            .with_state(request_id, HistoryAction::Checkpoint, |state| {
                state.stage = Stage::Checkpointed;
                Ok(())
            })
            .await?;
        let state = self.store.snapshot(request_id).await?;

        self.events.publish(OrchestrationEvent::CheckpointRestored {
            request_id: *request_id,
            checkpoint_id: checkpoint.checkpoint_id,
        });

        Ok(state)
    }

    async fn latest_checkpoint(
        &self,
        request_id: &RequestId,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.sorted_for_request(request_id).await?.pop())
    }

    /// Checkpoints for a request sorted oldest → newest, id as tie-break.
    async fn sorted_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Checkpoint>, CheckpointError> {
        let mut checkpoints = self.backend.list_for_request(request_id).await?;
        checkpoints.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.checkpoint_id.0.cmp(&b.checkpoint_id.0))
        });
        Ok(checkpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::capability::AgentName;
    use crate::infrastructure::checkpoint_store::InMemoryCheckpointStore;
    use async_trait::async_trait;

    struct Fixture {
        store: Arc<SharedStateStore>,
        manager: CheckpointManager,
        request_id: RequestId,
    }

    fn fixture_with_backend(backend: Arc<dyn CheckpointStore>) -> Fixture {
        let store = Arc::new(SharedStateStore::new());
        let request_id = RequestId::new();
        store
            .create_state(
                request_id,
                "user-1",
                AgentName::new("TwitterSpecialist"),
                HashMap::from([("url".to_string(), serde_json::json!("https://x.com/1"))]),
            )
            .unwrap();

        let manager = CheckpointManager::new(
            store.clone(),
            backend,
            Arc::new(EventBus::with_default_capacity()),
            CheckpointConfig::default(),
        );
        Fixture {
            store,
            manager,
            request_id,
        }
    }

    fn fixture() -> Fixture {
        fixture_with_backend(Arc::new(InMemoryCheckpointStore::new()))
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip() {
        let fx = fixture();

        let id = fx
            .manager
            .checkpoint(&fx.request_id, HashMap::new())
            .await
            .unwrap();
        let restored = fx.manager.restore(&id).await.unwrap();
        let current = fx.store.snapshot(&fx.request_id).await.unwrap();

        assert_eq!(restored.request_id, current.request_id);
        assert_eq!(restored.stage, current.stage);
        assert_eq!(restored.data, current.data);
        assert_eq!(restored.history.len(), current.history.len());
    }

    #[tokio::test]
    async fn test_restore_unknown_checkpoint() {
        let fx = fixture();
        let result = fx.manager.restore(&CheckpointId::new()).await;
        assert!(matches!(result, Err(CheckpointError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_latest_tracks_most_recent_snapshot() {
        let fx = fixture();

        assert!(fx.manager.latest(&fx.request_id).await.unwrap().is_none());

        fx.manager
            .checkpoint(&fx.request_id, HashMap::new())
            .await
            .unwrap();
        fx.store
            .update_stage(&fx.request_id, Stage::Processing, HistoryAction::Route)
            .await
            .unwrap();
        fx.manager
            .checkpoint(&fx.request_id, HashMap::new())
            .await
            .unwrap();

        let latest = fx.manager.latest(&fx.request_id).await.unwrap().unwrap();
        assert_eq!(latest.stage, Stage::Processing);
    }

    #[tokio::test]
    async fn test_prune_keeps_most_recent() {
        let fx = fixture();

        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(
                fx.manager
                    .checkpoint(&fx.request_id, HashMap::new())
                    .await
                    .unwrap(),
            );
        }

        fx.manager.prune(&fx.request_id, 3).await.unwrap();

        for pruned in &ids[..2] {
            assert!(matches!(
                fx.manager.restore(pruned).await,
                Err(CheckpointError::NotFound(_))
            ));
        }
        for kept in &ids[2..] {
            assert!(fx.manager.restore(kept).await.is_ok());
        }
    }

    #[tokio::test]
    async fn test_resume_reinstalls_latest_checkpoint() {
        let fx = fixture();

        fx.store
            .update_stage(&fx.request_id, Stage::Processing, HistoryAction::Route)
            .await
            .unwrap();
        fx.manager
            .checkpoint(&fx.request_id, HashMap::new())
            .await
            .unwrap();

        // Simulate a crash: the in-memory state is gone.
        fx.store.remove(&fx.request_id).await.unwrap();
        assert!(!fx.store.contains(&fx.request_id));

        let resumed = fx.manager.resume(&fx.request_id).await.unwrap();
        assert_eq!(resumed.stage, Stage::Checkpointed);
        assert!(fx.store.contains(&fx.request_id));

        // The resume itself is visible in history.
        let last = resumed.history.last().unwrap();
        assert_eq!(last.action, HistoryAction::Checkpoint);
        assert_eq!(last.from_stage, Stage::Processing);
    }

    #[tokio::test]
    async fn test_resume_without_checkpoints() {
        let fx = fixture();
        let result = fx.manager.resume(&fx.request_id).await;
        assert!(matches!(result, Err(CheckpointError::NothingToRestore(_))));
    }

    struct FailingStore;

    #[async_trait]
    impl CheckpointStore for FailingStore {
        async fn put(&self, _checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
            Err(CheckpointError::WriteFailed("disk full".to_string()))
        }

        async fn get(&self, _id: &CheckpointId) -> Result<Option<Checkpoint>, CheckpointError> {
            Ok(None)
        }

        async fn delete(&self, _id: &CheckpointId) -> Result<(), CheckpointError> {
            Ok(())
        }

        async fn list_for_request(
            &self,
            _request_id: &RequestId,
        ) -> Result<Vec<Checkpoint>, CheckpointError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_write_failure_surfaces() {
        let fx = fixture_with_backend(Arc::new(FailingStore));
        let result = fx.manager.checkpoint(&fx.request_id, HashMap::new()).await;
        assert!(matches!(result, Err(CheckpointError::WriteFailed(_))));
    }
}
