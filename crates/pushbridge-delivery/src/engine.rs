//! Bounded retry of a single message's delivery.
//!
//! # State machine
//!
//! ```text
//!              ┌──────────────────────────────┐
//!              ▼                              │
//!        ┌────────────┐  retryable, budget ┌──────────────┐
//! ──────▶│ Attempting │───────────────────▶│ BackoffWait  │
//!        └────────────┘                    └──────────────┘
//!          │    │    │                            │
//!   success│    │    │ retryable, no budget       │ cancelled
//!          ▼    │    ▼                            ▼
//!   Succeeded   │  ExhaustedRetries           Cancelled
//!               ▼
//!           FatalStop
//! ```
//!
//! The first attempt happens immediately. Every publish call and every
//! backoff wait is raced against the shutdown token, so cancellation is
//! observed without waiting for the current backoff to elapse.

use std::{sync::Arc, time::Duration};

use pushbridge_core::{Clock, OutboundMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    client::{PublishRequest, PushClient},
    error::{classify, DeliveryError, FailureClass, PushError, Result},
    retry::RetryPolicy,
};

/// Result of one publish call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The API accepted the notification.
    Delivered {
        /// Identifier assigned by the API
        message_id: String,
    },
    /// The call failed.
    Failed {
        /// Failure reported by the collaborator
        error: PushError,
        /// How the failure was classified
        class: FailureClass,
    },
}

/// One publish call within a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    /// 0-based attempt index.
    pub index: u32,
    /// Backoff waited before this attempt. Zero for the first attempt.
    pub waited: Duration,
    /// What happened.
    pub outcome: AttemptOutcome,
}

/// Every attempt of one delivery plus its terminal result.
#[derive(Debug)]
pub struct DeliveryTrace {
    /// Attempts in the order they were made.
    pub attempts: Vec<DeliveryAttempt>,
    /// Message identifier on success, terminal error otherwise.
    pub result: Result<String>,
}

impl DeliveryTrace {
    /// Number of publish calls made.
    pub fn attempt_count(&self) -> u32 {
        u32::try_from(self.attempts.len()).unwrap_or(u32::MAX)
    }

    /// Sum of all backoff waits.
    pub fn total_waited(&self) -> Duration {
        self.attempts.iter().map(|attempt| attempt.waited).sum()
    }
}

/// Delivers messages through a [`PushClient`] with bounded retry.
///
/// Cheap to clone; clones share the client, policy and clock.
#[derive(Debug, Clone)]
pub struct RetryEngine {
    client: Arc<dyn PushClient>,
    policy: Arc<RetryPolicy>,
    clock: Arc<dyn Clock>,
}

impl RetryEngine {
    /// Creates an engine.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if the policy is invalid.
    pub fn new(
        client: Arc<dyn PushClient>,
        policy: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        policy.validate()?;
        Ok(Self { client, policy: Arc::new(policy), clock })
    }

    /// Policy applied to every delivery.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Clock used for backoff waits.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Delivers `message` and returns the API's message identifier.
    ///
    /// # Errors
    ///
    /// - [`DeliveryError::Fatal`] on the first non-retryable failure
    /// - [`DeliveryError::RetriesExhausted`] when every allowed attempt failed
    /// - [`DeliveryError::Cancelled`] when `cancel` fires first
    pub async fn deliver(
        &self,
        message: &OutboundMessage,
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.deliver_traced(message, cancel).await.result
    }

    /// Like [`RetryEngine::deliver`] but also returns every attempt made.
    pub async fn deliver_traced(
        &self,
        message: &OutboundMessage,
        cancel: &CancellationToken,
    ) -> DeliveryTrace {
        let request = PublishRequest::from(message);
        let max_attempts = self.policy.max_attempts;
        let mut attempts = Vec::new();
        let mut waited = Duration::ZERO;
        let mut index = 0_u32;

        loop {
            debug!(
                endpoint = %request.target_endpoint,
                attempt = index + 1,
                max_attempts,
                "publishing notification"
            );

            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(attempt = index + 1, "delivery cancelled before publish completed");
                    return DeliveryTrace { attempts, result: Err(DeliveryError::Cancelled) };
                }
                outcome = self.client.publish(&request) => outcome,
            };

            let error = match outcome {
                Ok(message_id) => {
                    attempts.push(DeliveryAttempt {
                        index,
                        waited,
                        outcome: AttemptOutcome::Delivered { message_id: message_id.clone() },
                    });
                    return DeliveryTrace { attempts, result: Ok(message_id) };
                },
                Err(error) => error,
            };

            let class = classify(&error);
            attempts.push(DeliveryAttempt {
                index,
                waited,
                outcome: AttemptOutcome::Failed { error: error.clone(), class },
            });

            warn!(
                attempt = index + 1,
                max_attempts,
                error_kind = %error.kind,
                error = %error.message,
                class = %class,
                "publish attempt failed"
            );

            if !class.is_retryable() {
                error!(
                    attempt = index + 1,
                    error_kind = %error.kind,
                    error = %error.message,
                    "fatal delivery error, not retrying"
                );
                return DeliveryTrace { attempts, result: Err(DeliveryError::Fatal(error)) };
            }

            if !self.policy.allows_retry_after(index) {
                let attempts_made = index + 1;
                error!(
                    attempts = attempts_made,
                    error_kind = %error.kind,
                    error = %error.message,
                    "retry budget exhausted"
                );
                return DeliveryTrace {
                    attempts,
                    result: Err(DeliveryError::RetriesExhausted {
                        attempts: attempts_made,
                        last: error,
                    }),
                };
            }

            let delay = self.policy.delay_for(index + 1);
            info!(
                attempt = index + 2,
                max_attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "retry scheduled"
            );

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(attempt = index + 2, "delivery cancelled during backoff");
                    return DeliveryTrace { attempts, result: Err(DeliveryError::Cancelled) };
                }
                () = self.clock.sleep(delay) => {}
            }

            waited = delay;
            index += 1;
        }
    }
}
