//! Process-wide delivery counters.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use pushbridge_core::{EventHandler, ProcessingEvent};
use tracing::info;

/// Point-in-time copy of [`ProcessingStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Records that reached a decision.
    pub processed: u64,
    /// Notifications accepted by the push API.
    pub delivered: u64,
    /// Records rejected by validation.
    pub rejected: u64,
    /// Deliveries stopped by a non-retryable error.
    pub fatal: u64,
    /// Deliveries that used every allowed attempt.
    pub exhausted: u64,
    /// Publish calls across all records.
    pub publish_attempts: u64,
}

/// Event subscriber that counts outcomes.
///
/// Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct ProcessingStats {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    delivered: AtomicU64,
    rejected: AtomicU64,
    fatal: AtomicU64,
    exhausted: AtomicU64,
    publish_attempts: AtomicU64,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let c = &self.inner;
        let delivered = c.delivered.load(Ordering::Relaxed);
        let rejected = c.rejected.load(Ordering::Relaxed);
        let fatal = c.fatal.load(Ordering::Relaxed);
        let exhausted = c.exhausted.load(Ordering::Relaxed);

        StatsSnapshot {
            processed: delivered + rejected + fatal + exhausted,
            delivered,
            rejected,
            fatal,
            exhausted,
            publish_attempts: c.publish_attempts.load(Ordering::Relaxed),
        }
    }

    /// Logs the current counters at info level.
    pub fn log_summary(&self) {
        let s = self.snapshot();
        info!(
            processed = s.processed,
            delivered = s.delivered,
            rejected = s.rejected,
            fatal = s.fatal,
            exhausted = s.exhausted,
            publish_attempts = s.publish_attempts,
            "processing statistics"
        );
    }
}

#[async_trait]
impl EventHandler for ProcessingStats {
    async fn handle_event(&self, event: ProcessingEvent) {
        let c = &self.inner;
        match event {
            ProcessingEvent::Delivered(e) => {
                c.delivered.fetch_add(1, Ordering::Relaxed);
                c.publish_attempts.fetch_add(u64::from(e.attempts), Ordering::Relaxed);
            },
            ProcessingEvent::Rejected(_) => {
                c.rejected.fetch_add(1, Ordering::Relaxed);
            },
            ProcessingEvent::Failed(e) => {
                if e.exhausted {
                    c.exhausted.fetch_add(1, Ordering::Relaxed);
                } else {
                    c.fatal.fetch_add(1, Ordering::Relaxed);
                }
                c.publish_attempts.fetch_add(u64::from(e.attempts), Ordering::Relaxed);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pushbridge_core::{DeliveredEvent, FailedEvent, RecordOrigin, RejectedEvent};

    use super::*;

    fn origin(offset: i64) -> RecordOrigin {
        RecordOrigin::new("push", 0, offset)
    }

    fn failed(offset: i64, attempts: u32, exhausted: bool) -> ProcessingEvent {
        ProcessingEvent::Failed(FailedEvent {
            origin: origin(offset),
            error_kind: "InternalError".to_string(),
            error_message: "boom".to_string(),
            attempts,
            exhausted,
            failed_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn counts_each_outcome() {
        let stats = ProcessingStats::new();

        stats
            .handle_event(ProcessingEvent::Delivered(DeliveredEvent {
                origin: origin(1),
                message_id: "m-1".to_string(),
                attempts: 2,
                delivered_at: Utc::now(),
            }))
            .await;
        stats
            .handle_event(ProcessingEvent::Rejected(RejectedEvent {
                origin: origin(2),
                kind: "malformed".to_string(),
                field: None,
                reason: "not json".to_string(),
            }))
            .await;
        stats.handle_event(failed(3, 1, false)).await;
        stats.handle_event(failed(4, 3, true)).await;

        let snapshot = stats.snapshot();
        assert_eq!(
            snapshot,
            StatsSnapshot {
                processed: 4,
                delivered: 1,
                rejected: 1,
                fatal: 1,
                exhausted: 1,
                publish_attempts: 6,
            }
        );
    }

    #[tokio::test]
    async fn clones_share_counters() {
        let stats = ProcessingStats::new();
        let clone = stats.clone();

        clone.handle_event(failed(1, 1, false)).await;

        assert_eq!(stats.snapshot().fatal, 1);
    }
}
