//! Push delivery with bounded retry and per-partition claim processing.
//!
//! Takes validated notification messages to an SNS-compatible push API and
//! decides, per consumed record, whether the consumer group may advance its
//! offset.
//!
//! # Architecture
//!
//! ```text
//! RawRecord ─▶ validate ─▶ RetryEngine ─▶ PushClient ─▶ push API
//!                 │            │
//!                 ▼            ▼
//!           ClaimProcessor ◀───┘  ─▶ OffsetDecision ─▶ ConsumerSession
//! ```
//!
//! - **Failure classification** uses the structured error kind carried by
//!   [`PushError`], never the message text
//! - **Backoff** doubles from the initial delay and is capped, with optional
//!   bounded jitter
//! - **Cancellation** aborts publish calls and backoff waits immediately and
//!   leaves the in-flight record unmarked
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pushbridge_core::{NoOpEventHandler, RealClock};
//! use pushbridge_delivery::{
//!     ClaimProcessor, DeliveryError, RetryEngine, RetryPolicy, SnsClient, SnsConfig,
//! };
//!
//! # async fn example() -> std::result::Result<(), DeliveryError> {
//! let clock = Arc::new(RealClock::new());
//! let client = SnsClient::new(SnsConfig::default(), clock.clone()).await?;
//! let engine = RetryEngine::new(Arc::new(client), RetryPolicy::default(), clock)?;
//! let processor = ClaimProcessor::new(engine, Arc::new(NoOpEventHandler::new()));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod engine;
pub mod error;
pub mod processor;
pub mod retry;
pub mod sns;

pub use client::{PublishRequest, PushClient};
pub use engine::{AttemptOutcome, DeliveryAttempt, DeliveryTrace, RetryEngine};
pub use error::{classify, DeliveryError, FailureClass, PushError, PushErrorKind, Result};
pub use processor::{
    ClaimProcessor, ClaimSummary, ConsumerSession, Interrupted, MarkError, RecordFailure,
    RecordOutcome,
};
pub use retry::{backoff, RetryPolicy};
pub use sns::{SnsClient, SnsConfig};

/// Default maximum publish attempts per message.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default per-request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
