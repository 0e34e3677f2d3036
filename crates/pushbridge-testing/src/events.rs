//! Event handler that keeps everything it receives.

use std::sync::Mutex;

use pushbridge_core::{EventHandler, ProcessingEvent};

/// Collects processing events for later assertions.
#[derive(Debug, Default)]
pub struct CollectingEventHandler {
    events: Mutex<Vec<ProcessingEvent>>,
}

impl CollectingEventHandler {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events received so far, in order.
    pub fn events(&self) -> Vec<ProcessingEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Number of events received.
    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or_default()
    }

    /// Whether no events were received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of delivered events.
    pub fn delivered(&self) -> usize {
        self.count(|event| matches!(event, ProcessingEvent::Delivered(_)))
    }

    /// Number of rejected events.
    pub fn rejected(&self) -> usize {
        self.count(|event| matches!(event, ProcessingEvent::Rejected(_)))
    }

    /// Number of failed events.
    pub fn failed(&self) -> usize {
        self.count(|event| matches!(event, ProcessingEvent::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&ProcessingEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }
}

#[async_trait::async_trait]
impl EventHandler for CollectingEventHandler {
    async fn handle_event(&self, event: ProcessingEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
