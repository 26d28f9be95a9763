// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Caller-Facing Orchestration Result
//!
//! The structured result every request ends in: success or failure, the
//! accumulated data bag, and the full processing history for diagnostics.
//! Callers never see a raw error; failures carry a typed `kind` plus message.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use murmuration_core::domain::state::{HistoryEntry, RequestId};

/// Failure classification surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    AgentUnavailable,
    NodeTimeout,
    TerminalFailure,
    CheckpointWriteFailed,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::AgentUnavailable => "agent_unavailable",
            ErrorKind::NodeTimeout => "node_timeout",
            ErrorKind::TerminalFailure => "terminal_failure",
            ErrorKind::CheckpointWriteFailed => "checkpoint_write_failed",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

/// What the supervisor hands back for every processed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResult {
    pub request_id: RequestId,
    pub success: bool,

    /// Data bag accumulated by the agents, including the terminal `result`.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,

    /// Full per-request history for diagnostics, also on failure.
    #[serde(default)]
    pub processing_history: Vec<HistoryEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl OrchestrationResult {
    pub fn success(
        request_id: RequestId,
        data: HashMap<String, serde_json::Value>,
        processing_history: Vec<HistoryEntry>,
    ) -> Self {
        Self {
            request_id,
            success: true,
            data,
            processing_history,
            error: None,
        }
    }

    pub fn failure(
        request_id: RequestId,
        kind: ErrorKind,
        message: impl Into<String>,
        processing_history: Vec<HistoryEntry>,
    ) -> Self {
        Self {
            request_id,
            success: false,
            data: HashMap::new(),
            processing_history,
            error: Some(ErrorInfo {
                kind,
                message: message.into(),
            }),
        }
    }
}
