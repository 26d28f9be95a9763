// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Checkpoint Store Backends
//!
//! Two implementations of the [`CheckpointStore`] seam: an in-memory store
//! for tests and ephemeral deployments, and a sled-backed store for durable
//! recovery across process restarts. Checkpoints are serialized as JSON
//! blobs keyed by checkpoint id.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::domain::checkpoint::{Checkpoint, CheckpointError, CheckpointId, CheckpointStore};
use crate::domain::state::RequestId;

/// Volatile checkpoint store. Contents are lost on drop.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: RwLock<HashMap<CheckpointId, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.read().is_empty()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.checkpoints
            .write()
            .insert(checkpoint.checkpoint_id, checkpoint.clone());
        Ok(())
    }

    async fn get(&self, id: &CheckpointId) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.checkpoints.read().get(id).cloned())
    }

    async fn delete(&self, id: &CheckpointId) -> Result<(), CheckpointError> {
        self.checkpoints.write().remove(id);
        Ok(())
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Checkpoint>, CheckpointError> {
        let mut checkpoints: Vec<Checkpoint> = self
            .checkpoints
            .read()
            .values()
            .filter(|checkpoint| checkpoint.request_id == *request_id)
            .cloned()
            .collect();
        checkpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(checkpoints)
    }
}

/// Durable checkpoint store backed by a sled tree.
pub struct SledCheckpointStore {
    db: sled::Db,
}

impl SledCheckpointStore {
    /// Open (or create) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let db = sled::open(path).map_err(|e| CheckpointError::WriteFailed(e.to_string()))?;
        Ok(Self { db })
    }

    fn key(id: &CheckpointId) -> String {
        id.to_string()
    }
}

#[async_trait]
impl CheckpointStore for SledCheckpointStore {
    async fn put(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let blob = serde_json::to_vec(checkpoint)
            .map_err(|e| CheckpointError::WriteFailed(e.to_string()))?;
        self.db
            .insert(Self::key(&checkpoint.checkpoint_id).as_bytes(), blob)
            .map_err(|e| CheckpointError::WriteFailed(e.to_string()))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| CheckpointError::WriteFailed(e.to_string()))?;
        debug!(checkpoint_id = %checkpoint.checkpoint_id, "checkpoint persisted");
        Ok(())
    }

    async fn get(&self, id: &CheckpointId) -> Result<Option<Checkpoint>, CheckpointError> {
        let Some(blob) = self
            .db
            .get(Self::key(id).as_bytes())
            .map_err(|e| CheckpointError::WriteFailed(e.to_string()))?
        else {
            return Ok(None);
        };
        let checkpoint =
            serde_json::from_slice(&blob).map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
        Ok(Some(checkpoint))
    }

    async fn delete(&self, id: &CheckpointId) -> Result<(), CheckpointError> {
        self.db
            .remove(Self::key(id).as_bytes())
            .map_err(|e| CheckpointError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<Checkpoint>, CheckpointError> {
        let mut checkpoints = Vec::new();
        for entry in self.db.iter() {
            let (_, blob) = entry.map_err(|e| CheckpointError::WriteFailed(e.to_string()))?;
            let checkpoint: Checkpoint = serde_json::from_slice(&blob)
                .map_err(|e| CheckpointError::Corrupt(e.to_string()))?;
            if checkpoint.request_id == *request_id {
                checkpoints.push(checkpoint);
            }
        }
        checkpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(checkpoints)
    }
}
