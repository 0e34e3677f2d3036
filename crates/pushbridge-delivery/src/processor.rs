//! Per-partition claim processing.
//!
//! [`ClaimProcessor::on_record`] turns one record into exactly one
//! [`OffsetDecision`]: validation, then delivery with bounded retry.
//! [`ClaimProcessor::run_claim`] is the sequential loop for one partition
//! claim. It does not take the next record until the current one has a
//! decision, because marking a record consumed implicitly marks everything
//! before it in the partition.
//!
//! Every outcome advances the offset: delivered, rejected by validation,
//! fatal, and exhausted retries alike. Only shutdown leaves a record
//! unmarked, so it is redelivered on restart.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use pushbridge_core::{
    validate, DeliveredEvent, EventHandler, FailedEvent, OffsetDecision, PartitionKey,
    ProcessingEvent, RawRecord, RecordOrigin, RejectedEvent, ValidationError,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{engine::RetryEngine, error::DeliveryError};

/// Shutdown interrupted a record before it reached a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("record processing interrupted by shutdown")]
pub struct Interrupted;

/// Failure to mark a record consumed with the broker.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to mark {origin} consumed: {message}")]
pub struct MarkError {
    /// Record that could not be marked
    pub origin: RecordOrigin,
    /// Broker error description
    pub message: String,
}

/// Acknowledgment primitive of the consumer group.
///
/// Marking a record consumed is positional: it covers every earlier record
/// of the same partition.
pub trait ConsumerSession: Send + Sync {
    /// Marks `origin` consumed.
    ///
    /// # Errors
    ///
    /// Returns a [`MarkError`] when the broker client rejects the mark.
    fn mark_consumed(&self, origin: &RecordOrigin) -> Result<(), MarkError>;
}

/// Why a record that advanced was not delivered.
#[derive(Debug)]
pub enum RecordFailure {
    /// Payload failed validation; the push API was never called.
    Rejected(ValidationError),
    /// Delivery stopped on a fatal error or exhausted its retries.
    Undeliverable(DeliveryError),
}

/// Decision for one record plus what led to it.
#[derive(Debug)]
pub struct RecordOutcome {
    /// What to tell the consumer group.
    pub decision: OffsetDecision,
    /// Identifier assigned by the push API on success.
    pub message_id: Option<String>,
    /// Publish calls made for this record.
    pub attempts: u32,
    /// Error surfaced for observability, when the record was not delivered.
    pub failure: Option<RecordFailure>,
}

impl RecordOutcome {
    /// Whether the notification was delivered.
    pub fn is_delivered(&self) -> bool {
        self.message_id.is_some()
    }
}

/// Counters for one finished claim loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClaimSummary {
    /// Records taken from the channel.
    pub received: u64,
    /// Records marked consumed.
    pub advanced: u64,
    /// Records decided `Hold`.
    pub held: u64,
    /// Advance decisions the session failed to record.
    pub mark_failures: u64,
    /// Whether shutdown stopped the loop with a record in flight.
    pub interrupted: bool,
}

/// Validates and delivers records, and decides their offsets.
#[derive(Debug, Clone)]
pub struct ClaimProcessor {
    engine: RetryEngine,
    events: Arc<dyn EventHandler>,
}

impl ClaimProcessor {
    /// Creates a processor.
    pub fn new(engine: RetryEngine, events: Arc<dyn EventHandler>) -> Self {
        Self { engine, events }
    }

    /// Processes one record to a decision.
    ///
    /// # Errors
    ///
    /// Returns [`Interrupted`] when `cancel` fires before a decision is
    /// reached. The record must then not be marked consumed.
    pub async fn on_record(
        &self,
        record: &RawRecord,
        cancel: &CancellationToken,
    ) -> Result<RecordOutcome, Interrupted> {
        let origin = record.origin();
        let span = info_span!(
            "record",
            topic = %origin.topic,
            partition = origin.partition,
            offset = origin.offset
        );

        self.process(record, cancel).instrument(span).await
    }

    async fn process(
        &self,
        record: &RawRecord,
        cancel: &CancellationToken,
    ) -> Result<RecordOutcome, Interrupted> {
        let origin = record.origin();
        debug!(payload_bytes = record.len(), "record received");

        let message = match validate(record.payload()) {
            Ok(message) => message,
            Err(error) => {
                warn!(
                    error = %error,
                    kind = %error.kind(),
                    "invalid record, skipping"
                );
                self.events
                    .handle_event(ProcessingEvent::Rejected(RejectedEvent {
                        origin: origin.clone(),
                        kind: error.kind().to_string(),
                        field: error.field().map(str::to_string),
                        reason: error.to_string(),
                    }))
                    .await;

                return Ok(RecordOutcome {
                    decision: OffsetDecision::Advance,
                    message_id: None,
                    attempts: 0,
                    failure: Some(RecordFailure::Rejected(error)),
                });
            },
        };

        let trace = self.engine.deliver_traced(&message, cancel).await;
        let attempts = trace.attempt_count();

        match trace.result {
            Ok(message_id) => {
                info!(message_id = %message_id, attempts, "notification delivered");
                self.events
                    .handle_event(ProcessingEvent::Delivered(DeliveredEvent {
                        origin: origin.clone(),
                        message_id: message_id.clone(),
                        attempts,
                        delivered_at: self.now(),
                    }))
                    .await;

                Ok(RecordOutcome {
                    decision: OffsetDecision::Advance,
                    message_id: Some(message_id),
                    attempts,
                    failure: None,
                })
            },
            Err(DeliveryError::Cancelled) => {
                info!(attempts, "record interrupted by shutdown, leaving offset in place");
                Err(Interrupted)
            },
            Err(failure) => {
                let error_kind = failure
                    .push_error()
                    .map_or_else(|| "Configuration".to_string(), |e| e.kind.to_string());
                let exhausted = matches!(failure, DeliveryError::RetriesExhausted { .. });

                error!(
                    error = %failure,
                    error_kind = %error_kind,
                    attempts,
                    exhausted,
                    "notification undeliverable, advancing offset"
                );
                self.events
                    .handle_event(ProcessingEvent::Failed(FailedEvent {
                        origin: origin.clone(),
                        error_kind,
                        error_message: failure.to_string(),
                        attempts,
                        exhausted,
                        failed_at: self.now(),
                    }))
                    .await;

                Ok(RecordOutcome {
                    decision: OffsetDecision::Advance,
                    message_id: None,
                    attempts,
                    failure: Some(RecordFailure::Undeliverable(failure)),
                })
            },
        }
    }

    /// Runs the sequential claim loop for one partition.
    ///
    /// Stops when the channel closes or `cancel` fires. A record interrupted
    /// by shutdown is left unmarked.
    pub async fn run_claim(
        &self,
        key: &PartitionKey,
        mut records: mpsc::Receiver<RawRecord>,
        session: &dyn ConsumerSession,
        cancel: &CancellationToken,
    ) -> ClaimSummary {
        let mut summary = ClaimSummary::default();
        info!(topic = %key.topic, partition = key.partition, "claim loop started");

        loop {
            let record = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                record = records.recv() => match record {
                    Some(record) => record,
                    None => break,
                },
            };
            summary.received += 1;

            let outcome = match self.on_record(&record, cancel).await {
                Ok(outcome) => outcome,
                Err(Interrupted) => {
                    summary.interrupted = true;
                    break;
                },
            };

            match outcome.decision {
                OffsetDecision::Advance => match session.mark_consumed(record.origin()) {
                    Ok(()) => summary.advanced += 1,
                    Err(e) => {
                        summary.mark_failures += 1;
                        warn!(error = %e, "offset not recorded");
                    },
                },
                OffsetDecision::Hold => summary.held += 1,
            }
        }

        info!(
            topic = %key.topic,
            partition = key.partition,
            received = summary.received,
            advanced = summary.advanced,
            interrupted = summary.interrupted,
            "claim loop stopped"
        );
        summary
    }

    fn now(&self) -> DateTime<Utc> {
        self.engine.clock().now_system().into()
    }
}
