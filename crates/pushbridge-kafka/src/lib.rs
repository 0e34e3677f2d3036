//! Kafka consumer-group source for the push bridge.
//!
//! Reads records from every assigned partition, hands each partition's
//! records to its own sequential claim loop, and turns Advance decisions
//! into stored offsets. The client commits stored offsets periodically and
//! once more, synchronously, on shutdown.
//!
//! ```text
//! StreamConsumer ─recv─▶ PartitionRouter ─┬─▶ claim loop topic[0] ─┐
//!                                          ├─▶ claim loop topic[1] ─┼─▶ store_offset
//!                                          └─▶ claim loop topic[n] ─┘
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod consumer;
pub mod error;
pub mod router;

pub use config::{KafkaConfig, OffsetReset};
pub use consumer::{KafkaSession, KafkaSource, SourceSummary};
pub use error::{KafkaError, Result};
pub use router::{PartitionRouter, RouterError};
