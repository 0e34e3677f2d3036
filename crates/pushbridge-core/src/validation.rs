//! Structural validation of record payloads.
//!
//! Turns raw bytes into an [`OutboundMessage`] or a [`ValidationError`].
//! Validation failures are never retried: a record that fails here can not
//! succeed on redelivery either.

use std::fmt;

use thiserror::Error;

use crate::models::OutboundMessage;

/// Why a payload was rejected.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Payload is not a JSON object of the expected shape.
    #[error("invalid message format: {source}")]
    Malformed {
        /// Underlying parse failure
        #[from]
        source: serde_json::Error,
    },

    /// A required field is absent or empty.
    #[error("{field} is required")]
    MissingField {
        /// Name of the missing field
        field: &'static str,
    },
}

/// Coarse classification of a [`ValidationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    /// Payload could not be parsed.
    Malformed,
    /// Payload parsed but a required field is empty.
    MissingField,
}

impl ValidationError {
    /// Returns the error kind.
    pub fn kind(&self) -> ValidationErrorKind {
        match self {
            Self::Malformed { .. } => ValidationErrorKind::Malformed,
            Self::MissingField { .. } => ValidationErrorKind::MissingField,
        }
    }

    /// Name of the missing field for [`ValidationErrorKind::MissingField`].
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::MissingField { field } => Some(field),
            Self::Malformed { .. } => None,
        }
    }
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed"),
            Self::MissingField => write!(f, "missing_field"),
        }
    }
}

/// Parses and checks a record payload.
///
/// The endpoint is checked before the body, so a payload missing both
/// reports the endpoint. A bare JSON `null` counts as an empty object.
///
/// # Errors
///
/// Returns [`ValidationError::Malformed`] when the payload is not a JSON
/// object with string fields, and [`ValidationError::MissingField`] when
/// `endpoint_arn` or `body` is empty.
pub fn validate(payload: &[u8]) -> Result<OutboundMessage, ValidationError> {
    let message = serde_json::from_slice::<Option<OutboundMessage>>(payload)?.unwrap_or_default();

    if message.target_endpoint.is_empty() {
        return Err(ValidationError::MissingField { field: "endpoint" });
    }
    if message.body.is_empty() {
        return Err(ValidationError::MissingField { field: "body" });
    }

    Ok(message)
}
