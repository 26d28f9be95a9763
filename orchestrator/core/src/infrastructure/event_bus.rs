// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Event Bus - Pub/Sub for Orchestration Events
//
// In-memory event streaming over tokio broadcast channels. Lets observers
// (progress reporters, the host's chat front-end, log sinks) follow workflow
// progress without coupling to the managers that produce the events.
//
// In-memory only: events are lost on restart.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::events::OrchestrationEvent;
use crate::domain::state::RequestId;

/// Event bus for publishing and subscribing to orchestration events.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<OrchestrationEvent>>,
}

impl EventBus {
    /// Create a new event bus. Capacity bounds how many events are buffered
    /// per receiver before old ones are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Event bus with the default capacity (1000).
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers. Publishing with no subscribers is
    /// not an error.
    pub fn publish(&self, event: OrchestrationEvent) {
        debug!("publishing event: {:?}", event);
        let _ = self.sender.send(event);
    }

    /// Subscribe to all orchestration events.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to events for a single request only.
    pub fn subscribe_request(&self, request_id: RequestId) -> RequestEventReceiver {
        RequestEventReceiver {
            receiver: self.sender.subscribe(),
            request_id,
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all orchestration events.
pub struct EventReceiver {
    receiver: broadcast::Receiver<OrchestrationEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<OrchestrationEvent, broadcast::error::RecvError> {
        self.receiver.recv().await
    }
}

/// Receiver filtered to a single request's events.
pub struct RequestEventReceiver {
    receiver: broadcast::Receiver<OrchestrationEvent>,
    request_id: RequestId,
}

impl RequestEventReceiver {
    /// Receive the next event for the subscribed request, skipping events
    /// belonging to other requests.
    pub async fn recv(&mut self) -> Result<OrchestrationEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if event.request_id() == self.request_id {
                return Ok(event);
            }
        }
    }
}
