//! Service configuration.

use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use pushbridge_delivery::{RetryPolicy, SnsConfig};
use pushbridge_kafka::{KafkaConfig, OffsetReset};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "pushbridge.toml";

/// Complete service configuration.
///
/// Loaded in priority order:
/// 1. Environment variables (highest priority, including a `.env` file)
/// 2. Configuration file (`pushbridge.toml`)
/// 3. Built-in defaults (lowest priority)
///
/// Only the push API credentials have no usable default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // Kafka
    /// Comma-separated bootstrap servers.
    ///
    /// Environment variable: `KAFKA_BROKERS`
    #[serde(default = "default_brokers", alias = "KAFKA_BROKERS")]
    pub kafka_brokers: String,
    /// Comma-separated topics to consume.
    ///
    /// Environment variable: `KAFKA_TOPICS`
    #[serde(default = "default_topics", alias = "KAFKA_TOPICS")]
    pub kafka_topics: String,
    /// Consumer group id.
    ///
    /// Environment variable: `KAFKA_GROUP_ID`
    #[serde(default = "default_group_id", alias = "KAFKA_GROUP_ID")]
    pub kafka_group_id: String,
    /// Start position without a committed offset: `latest` or `earliest`.
    ///
    /// Environment variable: `KAFKA_OFFSET_RESET`
    #[serde(default = "default_offset_reset", alias = "KAFKA_OFFSET_RESET")]
    pub kafka_offset_reset: String,

    // Push API
    /// Base URL of the push API.
    ///
    /// Environment variable: `CNS_ENDPOINT`
    #[serde(default = "default_cns_endpoint", alias = "CNS_ENDPOINT")]
    pub cns_endpoint: String,
    /// Signing region.
    ///
    /// Environment variable: `CNS_REGION`
    #[serde(default = "default_cns_region", alias = "CNS_REGION")]
    pub cns_region: String,
    /// Access key identifier.
    ///
    /// Environment variable: `CNS_ACCESS_KEY_ID`
    #[serde(default, alias = "CNS_ACCESS_KEY_ID")]
    pub cns_access_key_id: String,
    /// Secret access key.
    ///
    /// Environment variable: `CNS_SECRET_ACCESS_KEY`
    #[serde(default, alias = "CNS_SECRET_ACCESS_KEY")]
    pub cns_secret_access_key: String,
    /// Platform application used to register device tokens.
    ///
    /// Environment variable: `CNS_PLATFORM_ARN`
    #[serde(default, alias = "CNS_PLATFORM_ARN")]
    pub cns_platform_arn: String,
    /// Per-request timeout in milliseconds.
    ///
    /// Environment variable: `CNS_REQUEST_TIMEOUT_MS`
    #[serde(default = "default_request_timeout_ms", alias = "CNS_REQUEST_TIMEOUT_MS")]
    pub cns_request_timeout_ms: u64,

    // Retry
    /// Maximum publish attempts per message, including the first.
    ///
    /// Environment variable: `MAX_RETRY_ATTEMPTS`
    #[serde(default = "default_retry_attempts", alias = "MAX_RETRY_ATTEMPTS")]
    pub max_retry_attempts: u32,
    /// Wait before the first retry in milliseconds.
    ///
    /// Environment variable: `RETRY_INITIAL_DELAY_MS`
    #[serde(default = "default_initial_delay_ms", alias = "RETRY_INITIAL_DELAY_MS")]
    pub retry_initial_delay_ms: u64,
    /// Maximum wait between retries in milliseconds.
    ///
    /// Environment variable: `RETRY_MAX_DELAY_MS`
    #[serde(default = "default_max_delay_ms", alias = "RETRY_MAX_DELAY_MS")]
    pub retry_max_delay_ms: u64,
    /// Wait before the first retry as a duration string such as `1s` or
    /// `500ms`. Overrides `retry_initial_delay_ms` when set.
    ///
    /// Environment variable: `RETRY_INITIAL_DELAY`
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none",
        alias = "RETRY_INITIAL_DELAY"
    )]
    pub retry_initial_delay: Option<Duration>,
    /// Maximum wait between retries as a duration string. Overrides
    /// `retry_max_delay_ms` when set.
    ///
    /// Environment variable: `RETRY_MAX_DELAY`
    #[serde(
        default,
        with = "humantime_serde",
        skip_serializing_if = "Option::is_none",
        alias = "RETRY_MAX_DELAY"
    )]
    pub retry_max_delay: Option<Duration>,
    /// Jitter factor for retry waits (0.0 to 1.0).
    ///
    /// Environment variable: `RETRY_JITTER_FACTOR`
    #[serde(default, alias = "RETRY_JITTER_FACTOR")]
    pub retry_jitter_factor: f64,

    // Processing
    /// Records buffered per partition before the receive loop waits.
    ///
    /// Environment variable: `PARTITION_QUEUE_SIZE`
    #[serde(default = "default_queue_size", alias = "PARTITION_QUEUE_SIZE")]
    pub partition_queue_size: usize,
    /// Grace period for claim loops on shutdown, in seconds.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECONDS`
    #[serde(default = "default_shutdown_timeout", alias = "SHUTDOWN_TIMEOUT_SECONDS")]
    pub shutdown_timeout_seconds: u64,
}

impl Config {
    /// Loads configuration from defaults, config file, and environment
    /// variable overrides, then validates it.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(""));

        let config: Self = figment.extract().context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Retry policy shared by every delivery.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retry_attempts, self.initial_delay(), self.max_delay())
            .with_jitter(self.retry_jitter_factor)
    }

    fn initial_delay(&self) -> Duration {
        self.retry_initial_delay
            .unwrap_or_else(|| Duration::from_millis(self.retry_initial_delay_ms))
    }

    fn max_delay(&self) -> Duration {
        self.retry_max_delay.unwrap_or_else(|| Duration::from_millis(self.retry_max_delay_ms))
    }

    /// Push client settings.
    pub fn to_sns_config(&self) -> SnsConfig {
        SnsConfig {
            endpoint: self.cns_endpoint.clone(),
            region: self.cns_region.clone(),
            access_key_id: self.cns_access_key_id.clone(),
            secret_access_key: self.cns_secret_access_key.clone(),
            timeout: Duration::from_millis(self.cns_request_timeout_ms),
        }
    }

    /// Consumer group settings.
    pub fn to_kafka_config(&self) -> Result<KafkaConfig> {
        let offset_reset: OffsetReset =
            self.kafka_offset_reset.parse().context("Invalid KAFKA_OFFSET_RESET")?;

        Ok(KafkaConfig {
            brokers: split_list(&self.kafka_brokers),
            topics: split_list(&self.kafka_topics),
            group_id: self.kafka_group_id.clone(),
            offset_reset,
            ..Default::default()
        })
    }

    /// Grace period for claim loops on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Access key with everything but the first four characters masked.
    pub fn access_key_masked(&self) -> String {
        mask(&self.cns_access_key_id)
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<()> {
        if self.cns_access_key_id.trim().is_empty() {
            anyhow::bail!("CNS_ACCESS_KEY_ID is required");
        }

        if self.cns_secret_access_key.trim().is_empty() {
            anyhow::bail!("CNS_SECRET_ACCESS_KEY is required");
        }

        if self.cns_request_timeout_ms == 0 {
            anyhow::bail!("cns_request_timeout_ms must be greater than 0");
        }

        if split_list(&self.kafka_brokers).is_empty() {
            anyhow::bail!("at least one Kafka broker is required");
        }

        if split_list(&self.kafka_topics).is_empty() {
            anyhow::bail!("at least one Kafka topic is required");
        }

        if self.kafka_group_id.trim().is_empty() {
            anyhow::bail!("kafka_group_id must not be empty");
        }

        self.kafka_offset_reset
            .parse::<OffsetReset>()
            .context("Invalid KAFKA_OFFSET_RESET")?;

        if self.partition_queue_size == 0 {
            anyhow::bail!("partition_queue_size must be greater than 0");
        }

        self.to_retry_policy().validate().context("Invalid retry policy")?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kafka_brokers: default_brokers(),
            kafka_topics: default_topics(),
            kafka_group_id: default_group_id(),
            kafka_offset_reset: default_offset_reset(),
            cns_endpoint: default_cns_endpoint(),
            cns_region: default_cns_region(),
            cns_access_key_id: String::new(),
            cns_secret_access_key: String::new(),
            cns_platform_arn: String::new(),
            cns_request_timeout_ms: default_request_timeout_ms(),
            max_retry_attempts: default_retry_attempts(),
            retry_initial_delay_ms: default_initial_delay_ms(),
            retry_max_delay_ms: default_max_delay_ms(),
            retry_initial_delay: None,
            retry_max_delay: None,
            retry_jitter_factor: 0.0,
            partition_queue_size: default_queue_size(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(4).collect();
    if secret.chars().count() <= 4 {
        return "***".to_string();
    }
    format!("{visible}***")
}

fn default_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_topics() -> String {
    "push-notifications".to_string()
}

fn default_group_id() -> String {
    "push-service-group".to_string()
}

fn default_offset_reset() -> String {
    "latest".to_string()
}

fn default_cns_endpoint() -> String {
    "https://notifications.yandexcloud.net/".to_string()
}

fn default_cns_region() -> String {
    "ru-central1".to_string()
}

fn default_request_timeout_ms() -> u64 {
    pushbridge_delivery::DEFAULT_TIMEOUT_MS
}

fn default_retry_attempts() -> u32 {
    pushbridge_delivery::DEFAULT_MAX_ATTEMPTS
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_queue_size() -> usize {
    100
}

fn default_shutdown_timeout() -> u64 {
    30
}
