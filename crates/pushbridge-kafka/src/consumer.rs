//! Consumer-group receive loop.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use pushbridge_core::{RawRecord, RecordOrigin};
use pushbridge_delivery::{ClaimProcessor, ConsumerSession, MarkError};
use rdkafka::{
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::{KafkaError as ClientError, RDKafkaErrorCode},
    message::BorrowedMessage,
    Message,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    config::KafkaConfig,
    error::{KafkaError, Result},
    router::PartitionRouter,
};

const RECEIVE_ERROR_PAUSE: Duration = Duration::from_millis(500);

/// Marks records consumed by storing `offset + 1` for their partition.
///
/// Stored offsets are committed by the client's auto-commit and by the final
/// commit in [`KafkaSource::run`].
#[derive(Clone)]
pub struct KafkaSession {
    consumer: Arc<StreamConsumer>,
}

impl KafkaSession {
    /// Wraps a consumer.
    pub fn new(consumer: Arc<StreamConsumer>) -> Self {
        Self { consumer }
    }
}

impl ConsumerSession for KafkaSession {
    fn mark_consumed(&self, origin: &RecordOrigin) -> std::result::Result<(), MarkError> {
        self.consumer
            .store_offset(&origin.topic, origin.partition, origin.next_offset())
            .map_err(|e| MarkError { origin: origin.clone(), message: e.to_string() })
    }
}

/// Counters for one run of the source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceSummary {
    /// Records received from the broker.
    pub received: u64,
    /// Records marked consumed by claim loops.
    pub advanced: u64,
    /// Receive errors reported by the client.
    pub receive_errors: u64,
    /// Claim loops that stopped with a record in flight.
    pub interrupted_claims: u64,
    /// Claim loops found dead on dispatch. Any such loop stops the source so
    /// the unmarked records are redelivered after a restart.
    pub stopped_claims: u64,
}

/// Consumer group subscribed to the configured topics.
pub struct KafkaSource {
    consumer: Arc<StreamConsumer>,
    topics: Vec<String>,
}

impl KafkaSource {
    /// Creates the consumer and subscribes to every configured topic.
    ///
    /// # Errors
    ///
    /// Returns [`KafkaError`] when the configuration is invalid, the client
    /// cannot be created, or the subscription fails.
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        config.validate()?;

        let consumer: StreamConsumer =
            config.client_config().create().map_err(KafkaError::Create)?;

        let topics = config.topic_names();
        consumer.subscribe(&topics).map_err(|source| KafkaError::Subscribe {
            topics: topics.iter().map(|t| (*t).to_string()).collect(),
            source,
        })?;

        info!(
            topics = ?topics,
            group_id = %config.group_id,
            offset_reset = %config.offset_reset,
            "Kafka consumer subscribed"
        );

        let topics = topics.into_iter().map(str::to_string).collect();
        Ok(Self { consumer: Arc::new(consumer), topics })
    }

    /// Session that stores offsets on this consumer.
    pub fn session(&self) -> KafkaSession {
        KafkaSession::new(self.consumer.clone())
    }

    /// Subscribed topics.
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Receives records until `cancel` fires or a claim loop dies, routing
    /// each record to its partition's claim loop.
    ///
    /// On cancellation the claim loops are given `shutdown_timeout` to stop,
    /// then stored offsets are committed synchronously.
    pub async fn run(
        self,
        processor: ClaimProcessor,
        queue_size: usize,
        shutdown_timeout: Duration,
        cancel: CancellationToken,
    ) -> SourceSummary {
        let session: Arc<dyn ConsumerSession> = Arc::new(self.session());
        let mut router = PartitionRouter::new(processor, session, queue_size, cancel.clone());
        let mut summary = SourceSummary::default();

        info!(queue_size, "receive loop started");

        loop {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                received = self.consumer.recv() => received.map(|message| to_record(&message)),
            };

            match received {
                Ok(record) => {
                    summary.received += 1;
                    debug!(origin = %record.origin(), "record received");
                    if let Err(e) = router.dispatch(record).await {
                        summary.stopped_claims += 1;
                        error!(error = %e, "record not dispatched, stopping the source");
                        cancel.cancel();
                        break;
                    }
                },
                Err(e) => {
                    summary.receive_errors += 1;
                    error!(error = %e, "Kafka receive error");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(RECEIVE_ERROR_PAUSE) => {}
                    }
                },
            }
        }

        info!("receive loop stopped, waiting for claim loops");
        for (_, claim) in router.shutdown(shutdown_timeout).await {
            summary.advanced += claim.advanced;
            if claim.interrupted {
                summary.interrupted_claims += 1;
            }
        }

        self.commit_final();
        summary
    }

    fn commit_final(&self) {
        match self.consumer.commit_consumer_state(CommitMode::Sync) {
            Ok(()) => info!("final offset commit completed"),
            Err(ClientError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {
                debug!("no stored offsets to commit");
            },
            Err(e) => error!(error = %e, "final offset commit failed"),
        }
    }
}

impl std::fmt::Debug for KafkaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSource").field("topics", &self.topics).finish_non_exhaustive()
    }
}

/// Copies a broker message into an owned record. A missing payload becomes
/// an empty one, which validation rejects.
fn to_record(message: &BorrowedMessage<'_>) -> RawRecord {
    let origin = RecordOrigin::new(message.topic(), message.partition(), message.offset());
    let payload = message.payload().map(Bytes::copy_from_slice).unwrap_or_default();
    RawRecord::new(origin, payload)
}
