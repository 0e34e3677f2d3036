//! Error types for the Kafka source.

use thiserror::Error;

/// Result type alias for Kafka source operations.
pub type Result<T> = std::result::Result<T, KafkaError>;

/// Failures that prevent the source from starting or running.
#[derive(Debug, Error)]
pub enum KafkaError {
    /// Consumer could not be created.
    #[error("failed to create Kafka consumer: {0}")]
    Create(#[source] rdkafka::error::KafkaError),

    /// Subscription to the configured topics failed.
    #[error("failed to subscribe to topics {topics:?}: {source}")]
    Subscribe {
        /// Topics requested
        topics: Vec<String>,
        /// Client error
        #[source]
        source: rdkafka::error::KafkaError,
    },

    /// Settings are invalid.
    #[error("invalid Kafka configuration: {message}")]
    Configuration {
        /// What is wrong
        message: String,
    },
}

impl KafkaError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}
