//! Core record model and primitives for the push bridge.
//!
//! Provides the raw record and outbound message types, the payload
//! validator, the clock abstraction used for backoff waits, and the
//! processing events emitted for every terminal record outcome. The
//! delivery and consumer crates build on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod events;
pub mod models;
pub mod time;
pub mod validation;

pub use events::{
    DeliveredEvent, EventHandler, FailedEvent, MulticastEventHandler, NoOpEventHandler,
    ProcessingEvent, RejectedEvent,
};
pub use models::{OffsetDecision, OutboundMessage, PartitionKey, RawRecord, RecordOrigin};
pub use time::{Clock, RealClock, TestClock};
pub use validation::{validate, ValidationError, ValidationErrorKind};
