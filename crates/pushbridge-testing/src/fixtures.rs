//! Raw record builders.

use bytes::Bytes;
use pushbridge_core::{RawRecord, RecordOrigin};
use serde_json::{json, Value};

/// Default topic used by fixtures.
pub const TEST_TOPIC: &str = "push-notifications";

/// JSON payload of a valid notification for `endpoint`.
pub fn valid_payload(endpoint: &str, body: &str) -> Vec<u8> {
    json!({"endpoint_arn": endpoint, "title": "Test", "body": body}).to_string().into_bytes()
}

/// Builder for [`RawRecord`] values.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    topic: String,
    partition: i32,
    offset: i64,
    payload: Bytes,
}

impl Default for RecordBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordBuilder {
    /// Creates a builder for a valid record at offset 0 of partition 0.
    pub fn new() -> Self {
        Self {
            topic: TEST_TOPIC.to_string(),
            partition: 0,
            offset: 0,
            payload: Bytes::from(valid_payload("ep1", "hello")),
        }
    }

    /// Sets the topic.
    #[must_use]
    pub fn topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    /// Sets the partition.
    #[must_use]
    pub fn partition(mut self, partition: i32) -> Self {
        self.partition = partition;
        self
    }

    /// Sets the offset.
    #[must_use]
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Uses a JSON value as payload.
    #[must_use]
    pub fn json(mut self, value: &Value) -> Self {
        self.payload = Bytes::from(value.to_string());
        self
    }

    /// Uses raw bytes as payload.
    #[must_use]
    pub fn raw(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Uses a valid notification for `endpoint` as payload.
    #[must_use]
    pub fn message(mut self, endpoint: &str, body: &str) -> Self {
        self.payload = Bytes::from(valid_payload(endpoint, body));
        self
    }

    /// Builds the record.
    pub fn build(self) -> RawRecord {
        RawRecord::new(RecordOrigin::new(self.topic, self.partition, self.offset), self.payload)
    }

    /// Builds `count` consecutive records starting at the configured offset.
    pub fn build_sequence(self, count: usize) -> Vec<RawRecord> {
        (0..count)
            .map(|i| {
                let offset = self.offset + i64::try_from(i).unwrap_or(i64::MAX);
                self.clone().offset(offset).build()
            })
            .collect()
    }
}
