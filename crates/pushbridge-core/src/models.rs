//! Records consumed from the log and the notification messages built from
//! them.
//!
//! A [`RawRecord`] is immutable once received and carries its position in
//! the log. An [`OutboundMessage`] is the typed form of its payload after
//! validation. [`OffsetDecision`] is what the claim loop reports back to the
//! consumer group for each record.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Position of a record within the partitioned log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordOrigin {
    /// Topic the record was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset of the record within the partition.
    pub offset: i64,
}

impl RecordOrigin {
    /// Creates an origin for the given topic, partition and offset.
    pub fn new(topic: impl Into<String>, partition: i32, offset: i64) -> Self {
        Self { topic: topic.into(), partition, offset }
    }

    /// Returns the partition this record belongs to.
    pub fn partition_key(&self) -> PartitionKey {
        PartitionKey::new(self.topic.clone(), self.partition)
    }

    /// Offset to store once this record is consumed.
    ///
    /// Consumer groups commit the position of the next record to read, so
    /// marking a record consumed stores `offset + 1`.
    pub fn next_offset(&self) -> i64 {
        self.offset.saturating_add(1)
    }
}

impl fmt::Display for RecordOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]@{}", self.topic, self.partition, self.offset)
    }
}

/// Identifies one partition claim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartitionKey {
    /// Topic name.
    pub topic: String,
    /// Partition number.
    pub partition: i32,
}

impl PartitionKey {
    /// Creates a key for the given topic and partition.
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self { topic: topic.into(), partition }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.topic, self.partition)
    }
}

/// Opaque record payload plus its provenance.
///
/// Owned by the claim loop of its partition until an offset decision is
/// made for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    origin: RecordOrigin,
    payload: Bytes,
}

impl RawRecord {
    /// Creates a record from its origin and payload bytes.
    pub fn new(origin: RecordOrigin, payload: impl Into<Bytes>) -> Self {
        Self { origin, payload: payload.into() }
    }

    /// Position of the record in the log.
    pub fn origin(&self) -> &RecordOrigin {
        &self.origin
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Validated notification request.
///
/// The wire form uses `endpoint_arn` for the target endpoint. `title` and
/// `data` are optional; `endpoint_arn` and `body` must be non-empty before a
/// message is accepted for delivery (see [`crate::validation::validate`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Target endpoint identifier.
    #[serde(rename = "endpoint_arn", default, deserialize_with = "null_as_empty")]
    pub target_endpoint: String,

    /// Notification title, may be empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,

    /// Notification body.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,

    /// Auxiliary key-value data forwarded to the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
}

impl OutboundMessage {
    /// Creates a message with no title or auxiliary data.
    pub fn new(target_endpoint: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            target_endpoint: target_endpoint.into(),
            title: String::new(),
            body: body.into(),
            data: None,
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Adds one auxiliary data entry.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.get_or_insert_with(Map::new).insert(key.into(), value.into());
        self
    }

    /// Auxiliary data, if any entries are present.
    pub fn non_empty_data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref().filter(|data| !data.is_empty())
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// What the consumer group is told once a record has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffsetDecision {
    /// Mark the record (and everything before it in the partition) consumed.
    Advance,
    /// Leave the offset where it is.
    Hold,
}

impl OffsetDecision {
    /// Whether the offset should move past this record.
    pub fn is_advance(self) -> bool {
        matches!(self, Self::Advance)
    }
}

impl fmt::Display for OffsetDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advance => write!(f, "advance"),
            Self::Hold => write!(f, "hold"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn next_offset_points_past_record() {
        let origin = RecordOrigin::new("push", 3, 41);
        assert_eq!(origin.next_offset(), 42);
        assert_eq!(origin.partition_key(), PartitionKey::new("push", 3));
    }

    #[test]
    fn origin_display_includes_position() {
        let origin = RecordOrigin::new("push", 0, 7);
        assert_eq!(origin.to_string(), "push[0]@7");
    }

    #[test]
    fn outbound_message_uses_wire_field_names() {
        let message = OutboundMessage::new("arn:ep", "hello").with_title("hi").with_data("k", "v");

        let encoded = serde_json::to_value(&message).unwrap();
        assert_eq!(
            encoded,
            json!({"endpoint_arn": "arn:ep", "title": "hi", "body": "hello", "data": {"k": "v"}})
        );
    }

    #[test]
    fn null_strings_decode_as_empty() {
        let message: OutboundMessage =
            serde_json::from_value(json!({"endpoint_arn": "ep", "title": null, "body": "b"}))
                .unwrap();
        assert_eq!(message.title, "");
        assert!(message.data.is_none());
    }

    #[test]
    fn empty_data_map_is_treated_as_absent() {
        let message: OutboundMessage =
            serde_json::from_value(json!({"endpoint_arn": "ep", "body": "b", "data": {}}))
                .unwrap();
        assert!(message.non_empty_data().is_none());
    }
}
