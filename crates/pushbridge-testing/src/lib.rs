//! Test doubles and fixtures for the push bridge.
//!
//! Provides a scripted push client, a consumer session that records which
//! records were marked consumed, an event handler that collects processing
//! events, and builders for raw records. Everything here is deterministic:
//! combine it with [`TestClock`] and no test has to wait for real backoff.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod events;
pub mod fixtures;
pub mod push;
pub mod session;

pub use events::CollectingEventHandler;
pub use fixtures::{valid_payload, RecordBuilder};
pub use pushbridge_core::{Clock, TestClock};
pub use push::{MockOutcome, MockPushClient};
pub use session::RecordingSession;
