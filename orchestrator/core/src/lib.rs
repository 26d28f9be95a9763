// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `murmuration-core` — Multi-Agent Coordination Substrate
//!
//! In-process coordination library for the murmuration orchestrator: routes a
//! unit of work through a directed graph of cooperating agents, validates
//! agent-to-agent handoffs, keeps per-request workflow state consistent under
//! concurrency, and checkpoints that state for fault recovery.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | Workflow state, handoffs, capabilities, graph nodes, capability seams |
//! | [`application`] | Application | State store, router, handoff manager, checkpoint manager, graph engine |
//! | [`infrastructure`] | Infrastructure | Event bus, checkpoint store backends |
//!
//! Agent business logic and intent classification are consumed through the
//! [`domain::agent`] traits; the crate never calls an LLM or touches the
//! network itself.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
