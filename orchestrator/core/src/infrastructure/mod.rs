// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure Layer
//!
//! Concrete backends behind the domain seams: the in-memory event bus and
//! the checkpoint persistence stores.

pub mod checkpoint_store;
pub mod event_bus;
