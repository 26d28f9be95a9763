// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `murmuration-swarm` — Swarm Coordination and Supervision
//!
//! Runs flat groups of peer agents (swarms) and the hierarchical supervisor
//! that routes requests across them, on top of the coordination substrate in
//! `murmuration-core`.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Team` aggregate, swarm outcomes, the caller-facing result |
//! | [`application`] | Application | `SwarmCoordinator` run loop, `Supervisor` |
//!
//! ## Key Concepts
//!
//! - **Swarm**: a fixed membership of peer agents for one domain (e.g. a
//!   "platform" team) where any member may hand off directly to any other
//!   member without going through the supervisor.
//! - **Supervisor**: classifies a request's intent through an external
//!   capability, delegates to the matching team, and aggregates the final
//!   result, retrying once against a secondary team when configured.

pub mod application;
pub mod domain;

pub use domain::*;
