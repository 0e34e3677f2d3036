//! Outcome events emitted by the claim processor.
//!
//! Every record that reaches a terminal outcome produces exactly one
//! [`ProcessingEvent`]. Subscribers (stats, metrics exporters, audit sinks)
//! implement [`EventHandler`] and never influence the offset decision.
//!
//! ```text
//! ┌────────────────┐  Delivered / Rejected / Failed  ┌───────────────────┐
//! │ ClaimProcessor │ ───────────────────────────────▶│ MulticastHandler  │
//! └────────────────┘                                 └───────────────────┘
//!                                                              │
//!                                                              ▼
//!                                                    stats, exporters, ...
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::RecordOrigin;

/// Terminal outcome of one record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProcessingEvent {
    /// Push API accepted the notification.
    Delivered(DeliveredEvent),

    /// Payload failed validation; nothing was sent.
    Rejected(RejectedEvent),

    /// Delivery stopped on a fatal error or exhausted its retry budget.
    Failed(FailedEvent),
}

impl ProcessingEvent {
    /// Record the event refers to.
    pub fn origin(&self) -> &RecordOrigin {
        match self {
            Self::Delivered(event) => &event.origin,
            Self::Rejected(event) => &event.origin,
            Self::Failed(event) => &event.origin,
        }
    }
}

/// Emitted when a notification was published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveredEvent {
    /// Record that produced the notification.
    pub origin: RecordOrigin,

    /// Identifier assigned by the push API.
    pub message_id: String,

    /// Number of publish calls made, including the successful one.
    pub attempts: u32,

    /// When the successful publish returned.
    pub delivered_at: DateTime<Utc>,
}

/// Emitted when a payload fails validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedEvent {
    /// Rejected record.
    pub origin: RecordOrigin,

    /// `malformed` or `missing_field`.
    pub kind: String,

    /// Missing field name, when applicable.
    pub field: Option<String>,

    /// Human-readable reason.
    pub reason: String,
}

/// Emitted when delivery gives up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedEvent {
    /// Record whose notification was not delivered.
    pub origin: RecordOrigin,

    /// Error kind code reported by the push collaborator.
    pub error_kind: String,

    /// Error description.
    pub error_message: String,

    /// Number of publish calls made.
    pub attempts: u32,

    /// `true` when the retry budget ran out, `false` on a fatal error.
    pub exhausted: bool,

    /// When delivery was abandoned.
    pub failed_at: DateTime<Utc>,
}

/// Receiver of processing events.
///
/// Handlers must not block record processing for long and must swallow
/// their own failures.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync + std::fmt::Debug {
    /// Handles one event.
    async fn handle_event(&self, event: ProcessingEvent);
}

/// Handler that discards every event.
#[derive(Debug, Default)]
pub struct NoOpEventHandler;

impl NoOpEventHandler {
    /// Creates a new no-op handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl EventHandler for NoOpEventHandler {
    async fn handle_event(&self, _event: ProcessingEvent) {}
}

/// Fans each event out to every registered subscriber concurrently.
#[derive(Debug, Clone, Default)]
pub struct MulticastEventHandler {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl MulticastEventHandler {
    /// Creates a handler with no subscribers.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Registers a subscriber.
    pub fn add_subscriber(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.handlers.len()
    }
}

#[async_trait::async_trait]
impl EventHandler for MulticastEventHandler {
    async fn handle_event(&self, event: ProcessingEvent) {
        let deliveries = self.handlers.iter().map(|handler| {
            let event = event.clone();
            async move {
                handler.handle_event(event).await;
            }
        });

        futures::future::join_all(deliveries).await;
    }
}
