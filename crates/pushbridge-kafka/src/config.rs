//! Consumer settings and their librdkafka form.

use std::{fmt, str::FromStr, time::Duration};

use rdkafka::config::ClientConfig;
use serde::{Deserialize, Serialize};

use crate::error::KafkaError;

/// Where a consumer group without a committed offset starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetReset {
    /// Only records produced after the group joins.
    #[default]
    Latest,
    /// From the beginning of each partition.
    Earliest,
}

impl OffsetReset {
    /// librdkafka `auto.offset.reset` value.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Earliest => "earliest",
        }
    }
}

impl fmt::Display for OffsetReset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OffsetReset {
    type Err = KafkaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "latest" | "newest" => Ok(Self::Latest),
            "earliest" | "oldest" => Ok(Self::Earliest),
            other => Err(KafkaError::configuration(format!(
                "unknown offset reset policy '{other}', expected 'latest' or 'earliest'"
            ))),
        }
    }
}

/// Consumer group settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Bootstrap servers.
    pub brokers: Vec<String>,
    /// Topics to subscribe to.
    pub topics: Vec<String>,
    /// Consumer group id.
    pub group_id: String,
    /// Start position for partitions without a committed offset.
    pub offset_reset: OffsetReset,
    /// Group session timeout.
    pub session_timeout: Duration,
    /// Interval between automatic commits of stored offsets.
    pub auto_commit_interval: Duration,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topics: vec!["push-notifications".to_string()],
            group_id: "push-service-group".to_string(),
            offset_reset: OffsetReset::Latest,
            session_timeout: Duration::from_secs(30),
            auto_commit_interval: Duration::from_secs(5),
        }
    }
}

impl KafkaConfig {
    /// Checks that brokers, topics and the group id are present.
    ///
    /// # Errors
    ///
    /// Returns [`KafkaError::Configuration`] naming the first empty setting.
    pub fn validate(&self) -> Result<(), KafkaError> {
        if self.brokers.iter().all(|broker| broker.trim().is_empty()) {
            return Err(KafkaError::configuration("at least one broker is required"));
        }
        if self.topics.iter().all(|topic| topic.trim().is_empty()) {
            return Err(KafkaError::configuration("at least one topic is required"));
        }
        if self.group_id.trim().is_empty() {
            return Err(KafkaError::configuration("consumer group id is required"));
        }
        Ok(())
    }

    /// Topic names with blanks removed.
    pub fn topic_names(&self) -> Vec<&str> {
        self.topics.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).collect()
    }

    /// librdkafka settings for the consumer.
    ///
    /// Offsets are committed automatically but only stored explicitly, so
    /// nothing is committed for a record until its claim loop marks it.
    pub fn client_config(&self) -> ClientConfig {
        let brokers = self
            .brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join(",");

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.commit.interval.ms", self.auto_commit_interval.as_millis().to_string())
            .set("auto.offset.reset", self.offset_reset.as_str())
            .set("session.timeout.ms", self.session_timeout.as_millis().to_string())
            .set("enable.partition.eof", "false");
        client_config
    }
}
