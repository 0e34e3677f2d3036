//! SNS-compatible push client.
//!
//! Built on `aws-sdk-sns` with a custom endpoint, region and static
//! credentials. The SDK's own retries are disabled; [`crate::RetryEngine`]
//! owns the retry budget. Service errors carry a structured code which
//! becomes the [`PushErrorKind`]; the free-text message is kept for
//! diagnostics only.

use std::{sync::Arc, time::Duration};

use aws_config::BehaviorVersion;
use aws_sdk_sns::{
    config::{
        http::HttpResponse, retry::RetryConfig, timeout::TimeoutConfig, Credentials, Region,
    },
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    Client,
};
use pushbridge_core::Clock;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

use crate::{
    client::{PublishRequest, PushClient},
    error::{DeliveryError, PushError, PushErrorKind},
};

const CREDENTIALS_PROVIDER: &str = "pushbridge";

/// Settings for [`SnsClient`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnsConfig {
    /// Base URL of the push API.
    pub endpoint: String,
    /// Signing region.
    pub region: String,
    /// Access key identifier.
    pub access_key_id: String,
    /// Secret access key.
    #[serde(skip_serializing, default)]
    pub secret_access_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for SnsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://notifications.yandexcloud.net/".to_string(),
            region: "ru-central1".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Push client for SNS-compatible notification services.
#[derive(Debug, Clone)]
pub struct SnsClient {
    sns: Client,
    clock: Arc<dyn Clock>,
}

impl SnsClient {
    /// Creates a client.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] when the endpoint is not an
    /// http(s) URL or credentials are empty.
    pub async fn new(config: SnsConfig, clock: Arc<dyn Clock>) -> Result<Self, DeliveryError> {
        let endpoint = config.endpoint.trim();
        let host = endpoint.strip_prefix("https://").or_else(|| endpoint.strip_prefix("http://"));
        if host.is_none_or(|host| host.trim_matches('/').is_empty() || host.contains(' ')) {
            return Err(DeliveryError::configuration(format!(
                "invalid push endpoint: {}",
                config.endpoint
            )));
        }
        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(DeliveryError::configuration("push API credentials are required"));
        }

        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            CREDENTIALS_PROVIDER,
        );

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .timeout_config(TimeoutConfig::builder().operation_timeout(config.timeout).build())
            .load()
            .await;

        Ok(Self { sns: Client::new(&sdk_config), clock })
    }

    /// Registers a device token with a platform application and returns the
    /// new endpoint identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`PushError`] when the API rejects the registration or the
    /// response has no `EndpointArn`.
    pub async fn create_platform_endpoint(
        &self,
        platform_arn: &str,
        device_token: &str,
    ) -> Result<String, PushError> {
        let span = info_span!("create_platform_endpoint", platform_arn = %platform_arn);

        async move {
            let output = self
                .sns
                .create_platform_endpoint()
                .platform_application_arn(platform_arn)
                .token(device_token)
                .send()
                .await
                .map_err(push_error)?;

            let endpoint_arn = output
                .endpoint_arn()
                .filter(|arn| !arn.is_empty())
                .ok_or_else(|| PushError::invalid_response("response has no EndpointArn"))?
                .to_string();

            tracing::info!(endpoint_arn = %endpoint_arn, "platform endpoint created");
            Ok(endpoint_arn)
        }
        .instrument(span)
        .await
    }
}

#[async_trait::async_trait]
impl PushClient for SnsClient {
    async fn publish(&self, request: &PublishRequest) -> Result<String, PushError> {
        let span = info_span!("publish", endpoint = %request.target_endpoint);

        async move {
            let started = self.clock.now();
            let result = self
                .sns
                .publish()
                .target_arn(&request.target_endpoint)
                .message(request.message_payload())
                .message_structure("json")
                .send()
                .await;

            tracing::debug!(
                success = result.is_ok(),
                duration_ms = u64::try_from(
                    self.clock.now().saturating_duration_since(started).as_millis()
                )
                .unwrap_or(u64::MAX),
                "push API responded"
            );

            let output = result.map_err(push_error)?;
            output
                .message_id()
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .ok_or_else(|| PushError::invalid_response("response has no MessageId"))
        }
        .instrument(span)
        .await
    }
}

/// Maps an SDK failure to a [`PushError`].
///
/// A service error's code wins; the HTTP status is only used when the
/// response carried no code.
fn push_error<E>(error: SdkError<E, HttpResponse>) -> PushError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let described = DisplayErrorContext(&error).to_string();

    let push_error = match &error {
        SdkError::ServiceError(service) => {
            let err = service.err();
            let message = err.message().unwrap_or("no error message").to_string();
            match err.code() {
                Some(code) => PushError::from_code(code.trim(), message),
                None => PushError::new(
                    PushErrorKind::from_status(service.raw().status().as_u16()),
                    message,
                ),
            }
        },
        SdkError::TimeoutError(_) => PushError::timeout(format!("request timed out: {described}")),
        SdkError::DispatchFailure(failure) if failure.is_timeout() => {
            PushError::timeout(format!("request timed out: {described}"))
        },
        SdkError::DispatchFailure(_) => {
            PushError::network(format!("request failed: {described}"))
        },
        SdkError::ResponseError(_) => {
            PushError::invalid_response(format!("unreadable response: {described}"))
        },
        _ => PushError::new(PushErrorKind::Other("ClientError".to_string()), described),
    };

    tracing::warn!(
        error_kind = %push_error.kind,
        error = %push_error.message,
        "push API call failed"
    );
    push_error
}

#[cfg(test)]
mod tests {
    use pushbridge_core::RealClock;

    use super::*;

    fn config() -> SnsConfig {
        SnsConfig {
            access_key_id: "AKID".to_string(),
            secret_access_key: "secret".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn new_rejects_missing_credentials() {
        let result = SnsClient::new(SnsConfig::default(), Arc::new(RealClock::new())).await;
        assert!(matches!(result, Err(DeliveryError::Configuration { .. })));
    }

    #[tokio::test]
    async fn new_rejects_invalid_endpoint() {
        for endpoint in ["not a url", "ftp://push.example", "https://"] {
            let config = SnsConfig { endpoint: endpoint.to_string(), ..config() };
            let result = SnsClient::new(config, Arc::new(RealClock::new())).await;
            assert!(
                matches!(result, Err(DeliveryError::Configuration { .. })),
                "{endpoint} should be rejected"
            );
        }
    }

    #[test]
    fn config_serialization_omits_secret() {
        let encoded = serde_json::to_string(&config()).unwrap();
        assert!(!encoded.contains("secret"));
    }
}
