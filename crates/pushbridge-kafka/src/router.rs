//! Per-partition routing of consumed records.
//!
//! Each (topic, partition) gets one bounded channel and one task running
//! the sequential claim loop. Records of one partition are processed in
//! arrival order; a record waiting in backoff never delays another
//! partition's loop. A full channel makes [`PartitionRouter::dispatch`]
//! wait, which pauses the shared receive loop.

use std::{collections::HashMap, sync::Arc, time::Duration};

use pushbridge_core::{PartitionKey, RawRecord};
use pushbridge_delivery::{ClaimProcessor, ClaimSummary, ConsumerSession};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Dispatch failures.
#[derive(Debug, Error)]
pub enum RouterError {
    /// The partition's claim loop is no longer accepting records.
    #[error("claim loop for {key} has stopped")]
    ClaimStopped {
        /// Partition whose loop stopped
        key: PartitionKey,
    },
}

struct Claim {
    sender: mpsc::Sender<RawRecord>,
    handle: JoinHandle<ClaimSummary>,
}

/// Fans records out to one claim loop per partition.
pub struct PartitionRouter {
    processor: ClaimProcessor,
    session: Arc<dyn ConsumerSession>,
    queue_size: usize,
    cancel: CancellationToken,
    claims: HashMap<PartitionKey, Claim>,
}

impl PartitionRouter {
    /// Creates a router. Claim loops are spawned lazily, on the first record
    /// of each partition.
    pub fn new(
        processor: ClaimProcessor,
        session: Arc<dyn ConsumerSession>,
        queue_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self { processor, session, queue_size: queue_size.max(1), cancel, claims: HashMap::new() }
    }

    /// Number of partitions with a claim loop, including stopped ones.
    pub fn active_claims(&self) -> usize {
        self.claims.len()
    }

    /// Partitions with a claim loop, sorted.
    pub fn partitions(&self) -> Vec<PartitionKey> {
        let mut keys: Vec<_> = self.claims.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Queues a record on its partition's claim loop, waiting while the
    /// partition's buffer is full.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ClaimStopped`] when the loop has exited. The
    /// record is not marked. The stopped claim stays registered, so every
    /// later record of that partition fails the same way; a fresh loop would
    /// mark offsets past the records the dead loop dropped.
    pub async fn dispatch(&mut self, record: RawRecord) -> Result<(), RouterError> {
        let key = record.origin().partition_key();
        let sender = match self.claims.get(&key) {
            Some(claim) => claim.sender.clone(),
            None => self.spawn_claim(key.clone()),
        };

        if sender.send(record).await.is_err() {
            return Err(RouterError::ClaimStopped { key });
        }
        Ok(())
    }

    fn spawn_claim(&mut self, key: PartitionKey) -> mpsc::Sender<RawRecord> {
        let (sender, receiver) = mpsc::channel(self.queue_size);
        let processor = self.processor.clone();
        let session = self.session.clone();
        let cancel = self.cancel.clone();
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            processor.run_claim(&task_key, receiver, session.as_ref(), &cancel).await
        });

        debug!(topic = %key.topic, partition = key.partition, "spawned claim loop");
        self.claims.insert(key, Claim { sender: sender.clone(), handle });
        sender
    }

    /// Closes every partition channel and waits for the claim loops.
    ///
    /// Loops drain their buffered records unless the cancellation token has
    /// fired, in which case they stop after the in-flight record. Loops
    /// still running after `timeout` are aborted.
    pub async fn shutdown(mut self, timeout: Duration) -> Vec<(PartitionKey, ClaimSummary)> {
        info!(
            claim_count = self.claims.len(),
            timeout_seconds = timeout.as_secs(),
            "stopping partition claim loops"
        );

        let mut pending: Vec<(PartitionKey, JoinHandle<ClaimSummary>)> = self
            .claims
            .drain()
            .map(|(key, claim)| {
                drop(claim.sender);
                (key, claim.handle)
            })
            .collect();
        pending.sort_by(|a, b| a.0.cmp(&b.0));

        let mut summaries = Vec::with_capacity(pending.len());
        let wait_all = async {
            for (key, handle) in &mut pending {
                match handle.await {
                    Ok(summary) => summaries.push((key.clone(), summary)),
                    Err(join_error) => {
                        error!(
                            topic = %key.topic,
                            partition = key.partition,
                            error = %join_error,
                            "claim loop panicked"
                        );
                    },
                }
            }
        };

        if tokio::time::timeout(timeout, wait_all).await.is_err() {
            warn!(
                timeout_seconds = timeout.as_secs(),
                "claim loops did not stop in time, aborting remaining loops"
            );
            for (_, handle) in &pending {
                handle.abort();
            }
        }

        info!(stopped = summaries.len(), "partition claim loops stopped");
        summaries
    }
}

impl std::fmt::Debug for PartitionRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionRouter")
            .field("queue_size", &self.queue_size)
            .field("partitions", &self.partitions())
            .finish_non_exhaustive()
    }
}
