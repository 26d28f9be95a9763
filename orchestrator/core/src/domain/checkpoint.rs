// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Checkpoint Domain Model
//!
//! A checkpoint is a durable point-in-time snapshot of a workflow's state,
//! taken at stage boundaries. The persistence backend is abstracted behind
//! [`CheckpointStore`] so hosts can plug in any durable key/value store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::state::{RequestId, Stage, StateError, WorkflowState};

/// Unique identifier for a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointId(pub Uuid);

impl CheckpointId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CheckpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Point-in-time snapshot of one workflow.
///
/// The id is random; `(request_id, stage, created_at)` are recorded alongside
/// so two checkpoints taken at the same stage in the same instant still get
/// distinct identities. Recency ordering uses `created_at` with the id as
/// tie-break.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: CheckpointId,
    pub request_id: RequestId,
    pub stage: Stage,
    pub state: WorkflowState,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn capture(state: WorkflowState, metadata: HashMap<String, serde_json::Value>) -> Self {
        Self {
            checkpoint_id: CheckpointId::new(),
            request_id: state.request_id,
            stage: state.stage,
            state,
            metadata,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("checkpoint {0} not found")]
    NotFound(CheckpointId),

    #[error("no checkpoints recorded for request {0}")]
    NothingToRestore(RequestId),

    #[error("checkpoint write failed: {0}")]
    WriteFailed(String),

    #[error("checkpoint payload is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Consumed capability: durable storage for checkpoint blobs.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    async fn get(&self, id: &CheckpointId) -> Result<Option<Checkpoint>, CheckpointError>;

    async fn delete(&self, id: &CheckpointId) -> Result<(), CheckpointError>;

    /// All checkpoints for a request, oldest first.
    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Checkpoint>, CheckpointError>;
}
