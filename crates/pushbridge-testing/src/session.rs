//! Consumer session that records mark-consumed calls.

use std::sync::Mutex;

use pushbridge_core::RecordOrigin;
use pushbridge_delivery::{ConsumerSession, MarkError};

/// [`ConsumerSession`] that keeps every marked origin in memory.
#[derive(Debug, Default)]
pub struct RecordingSession {
    marked: Mutex<Vec<RecordOrigin>>,
    fail_marks: bool,
}

impl RecordingSession {
    /// Creates a session that accepts every mark.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session that rejects every mark.
    pub fn failing() -> Self {
        Self { marked: Mutex::default(), fail_marks: true }
    }

    /// Origins marked consumed, in call order.
    pub fn marked(&self) -> Vec<RecordOrigin> {
        self.marked.lock().map(|marked| marked.clone()).unwrap_or_default()
    }

    /// Offsets marked consumed, in call order.
    pub fn marked_offsets(&self) -> Vec<i64> {
        self.marked().into_iter().map(|origin| origin.offset).collect()
    }

    /// Whether `offset` was marked in any partition.
    pub fn is_marked(&self, offset: i64) -> bool {
        self.marked_offsets().contains(&offset)
    }
}

impl ConsumerSession for RecordingSession {
    fn mark_consumed(&self, origin: &RecordOrigin) -> Result<(), MarkError> {
        if self.fail_marks {
            return Err(MarkError {
                origin: origin.clone(),
                message: "session rejected mark".to_string(),
            });
        }
        if let Ok(mut marked) = self.marked.lock() {
            marked.push(origin.clone());
        }
        Ok(())
    }
}
