//! Error types for push delivery.
//!
//! [`PushError`] is what the push collaborator returns for a single failed
//! publish call. It carries a structured [`PushErrorKind`] so the failure
//! classifier never has to inspect free-text messages. [`DeliveryError`] is
//! the terminal error of a whole delivery, after retries.

use std::fmt;

use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Recognized failure kinds reported by the push API or the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PushErrorKind {
    /// The API failed internally (`InternalError`, `InternalFailure`).
    InternalError,
    /// The API is temporarily unavailable (`ServiceUnavailable`).
    ServiceUnavailable,
    /// Request rate exceeded (`Throttling`, `Throttled`).
    Throttled,
    /// Target endpoint is disabled or does not exist.
    EndpointDisabled,
    /// Request parameters were rejected.
    InvalidParameter,
    /// Credentials or signature rejected.
    AuthorizationError,
    /// Referenced resource does not exist.
    NotFound,
    /// Connection could not be established or was reset.
    Network,
    /// No response within the request timeout.
    Timeout,
    /// Response could not be interpreted.
    InvalidResponse,
    /// Any other error code reported by the API.
    Other(String),
}

impl PushErrorKind {
    /// Maps an API error `Code` element to a kind.
    pub fn from_code(code: &str) -> Self {
        match code {
            "InternalError" | "InternalFailure" => Self::InternalError,
            "ServiceUnavailable" => Self::ServiceUnavailable,
            "Throttling" | "Throttled" | "ThrottlingException" => Self::Throttled,
            "EndpointDisabled" => Self::EndpointDisabled,
            "InvalidParameter" | "InvalidParameterValue" | "ValidationError" => {
                Self::InvalidParameter
            },
            "AuthorizationError"
            | "InvalidClientTokenId"
            | "SignatureDoesNotMatch"
            | "AccessDenied"
            | "IncompleteSignature" => Self::AuthorizationError,
            "NotFound" => Self::NotFound,
            other => Self::Other(other.to_string()),
        }
    }

    /// Maps an HTTP status to a kind when the response carried no code.
    pub fn from_status(status: u16) -> Self {
        match status {
            500 => Self::InternalError,
            503 => Self::ServiceUnavailable,
            429 => Self::Throttled,
            401 | 403 => Self::AuthorizationError,
            404 => Self::NotFound,
            400 => Self::InvalidParameter,
            s if (500..600).contains(&s) => Self::InternalError,
            s => Self::Other(format!("HTTP {s}")),
        }
    }

    /// Stable string form used in logs and events.
    pub fn as_str(&self) -> &str {
        match self {
            Self::InternalError => "InternalError",
            Self::ServiceUnavailable => "ServiceUnavailable",
            Self::Throttled => "Throttled",
            Self::EndpointDisabled => "EndpointDisabled",
            Self::InvalidParameter => "InvalidParameter",
            Self::AuthorizationError => "AuthorizationError",
            Self::NotFound => "NotFound",
            Self::Network => "Network",
            Self::Timeout => "Timeout",
            Self::InvalidResponse => "InvalidResponse",
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for PushErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single failed publish call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct PushError {
    /// Structured failure kind.
    pub kind: PushErrorKind,
    /// Human-readable description, for diagnostics only.
    pub message: String,
}

impl PushError {
    /// Creates an error of the given kind.
    pub fn new(kind: PushErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Creates an error from an API error code.
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        Self::new(PushErrorKind::from_code(code), message)
    }

    /// Creates a transport-level network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(PushErrorKind::Network, message)
    }

    /// Creates a request timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(PushErrorKind::Timeout, message)
    }

    /// Creates an error for a response that could not be interpreted.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(PushErrorKind::InvalidResponse, message)
    }

    /// Classifies this error. Shorthand for [`classify`].
    pub fn class(&self) -> FailureClass {
        classify(self)
    }
}

/// Whether a failed attempt may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Transient server-side condition; another attempt may succeed.
    Retryable,
    /// Retrying cannot change the outcome.
    Fatal,
}

impl FailureClass {
    /// Whether the failure is retryable.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Retryable)
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retryable => write!(f, "retryable"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// Classifies a publish failure by its kind.
///
/// Only internal-error, service-unavailable and throttling kinds are
/// retryable. Transport failures are fatal: the original request may have
/// reached the API, and the record is not held for them.
pub fn classify(error: &PushError) -> FailureClass {
    match error.kind {
        PushErrorKind::InternalError
        | PushErrorKind::ServiceUnavailable
        | PushErrorKind::Throttled => FailureClass::Retryable,
        _ => FailureClass::Fatal,
    }
}

/// Terminal outcome of a delivery that did not succeed.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// A non-retryable failure stopped delivery.
    #[error("fatal delivery error: {0}")]
    Fatal(PushError),

    /// Every allowed attempt failed with a retryable error.
    #[error("delivery failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Total publish calls made
        attempts: u32,
        /// Failure of the final attempt
        last: PushError,
    },

    /// Shutdown interrupted an attempt or backoff wait.
    #[error("delivery cancelled")]
    Cancelled,

    /// Retry policy or client settings are invalid.
    #[error("invalid delivery configuration: {message}")]
    Configuration {
        /// What is wrong
        message: String,
    },
}

impl DeliveryError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Whether this error is the result of cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Underlying publish failure, if any.
    pub fn push_error(&self) -> Option<&PushError> {
        match self {
            Self::Fatal(error) | Self::RetriesExhausted { last: error, .. } => Some(error),
            Self::Cancelled | Self::Configuration { .. } => None,
        }
    }

    /// Number of publish calls made before giving up, when known.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::RetriesExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes_are_retryable() {
        for code in ["InternalError", "ServiceUnavailable", "Throttling"] {
            let error = PushError::from_code(code, "try later");
            assert_eq!(classify(&error), FailureClass::Retryable, "{code}");
        }
    }

    #[test]
    fn rejection_codes_are_fatal() {
        for code in ["EndpointDisabled", "InvalidParameter", "AuthorizationError", "Bogus"] {
            let error = PushError::from_code(code, "no");
            assert_eq!(classify(&error), FailureClass::Fatal, "{code}");
        }
    }

    #[test]
    fn classification_ignores_message_text() {
        let error = PushError::from_code("InvalidParameter", "ServiceUnavailable InternalError");
        assert_eq!(error.class(), FailureClass::Fatal);
    }

    #[test]
    fn transport_failures_are_fatal() {
        assert_eq!(PushError::network("reset").class(), FailureClass::Fatal);
        assert_eq!(PushError::timeout("10s").class(), FailureClass::Fatal);
    }

    #[test]
    fn status_fallback_matches_codes() {
        assert_eq!(PushErrorKind::from_status(500), PushErrorKind::InternalError);
        assert_eq!(PushErrorKind::from_status(502), PushErrorKind::InternalError);
        assert_eq!(PushErrorKind::from_status(503), PushErrorKind::ServiceUnavailable);
        assert_eq!(PushErrorKind::from_status(429), PushErrorKind::Throttled);
        assert_eq!(PushErrorKind::from_status(403), PushErrorKind::AuthorizationError);
    }

    #[test]
    fn unknown_codes_keep_their_name() {
        let kind = PushErrorKind::from_code("KMSThrottling");
        assert_eq!(kind.as_str(), "KMSThrottling");
    }

    #[test]
    fn exhaustion_reports_last_failure_and_attempts() {
        let last = PushError::from_code("Throttling", "slow down");
        let error = DeliveryError::RetriesExhausted { attempts: 3, last: last.clone() };

        assert_eq!(error.attempts(), Some(3));
        assert_eq!(error.push_error(), Some(&last));
        assert_eq!(error.to_string(), "delivery failed after 3 attempts: Throttled: slow down");
    }
}
