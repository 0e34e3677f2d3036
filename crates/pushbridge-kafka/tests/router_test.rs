//! Integration tests for per-partition routing.
//!
//! Run the router against a scripted push client and a recording session,
//! so no broker is needed.

#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use pushbridge_core::{EventHandler, NoOpEventHandler, PartitionKey, ProcessingEvent, RealClock};
use pushbridge_delivery::{ClaimProcessor, RetryEngine, RetryPolicy};
use pushbridge_kafka::{PartitionRouter, RouterError};
use pushbridge_testing::{MockOutcome, MockPushClient, RecordBuilder, RecordingSession, TestClock};
use tokio_util::sync::CancellationToken;

fn processor(client: Arc<MockPushClient>, policy: RetryPolicy, real_time: bool) -> ClaimProcessor {
    let engine = if real_time {
        RetryEngine::new(client, policy, Arc::new(RealClock::new())).unwrap()
    } else {
        RetryEngine::new(client, policy, Arc::new(TestClock::new())).unwrap()
    };
    ClaimProcessor::new(engine, Arc::new(NoOpEventHandler::new()))
}

#[tokio::test]
async fn each_partition_gets_its_own_claim_loop() -> Result<()> {
    let client = Arc::new(MockPushClient::new());
    let session = Arc::new(RecordingSession::new());
    let mut router = PartitionRouter::new(
        processor(client.clone(), RetryPolicy::default(), false),
        session.clone(),
        8,
        CancellationToken::new(),
    );

    for partition in 0..3 {
        for record in RecordBuilder::new().partition(partition).offset(100).build_sequence(4) {
            router.dispatch(record).await?;
        }
    }

    assert_eq!(router.active_claims(), 3);
    assert_eq!(router.partitions()[0], PartitionKey::new("push-notifications", 0));

    let summaries = router.shutdown(Duration::from_secs(5)).await;

    assert_eq!(summaries.len(), 3);
    for (_, summary) in &summaries {
        assert_eq!(summary.advanced, 4);
        assert!(!summary.interrupted);
    }
    assert_eq!(client.call_count(), 12);

    for partition in 0..3 {
        let offsets: Vec<i64> = session
            .marked()
            .into_iter()
            .filter(|origin| origin.partition == partition)
            .map(|origin| origin.offset)
            .collect();
        assert_eq!(offsets, vec![100, 101, 102, 103], "partition {partition} out of order");
    }
    Ok(())
}

#[tokio::test]
async fn backoff_in_one_partition_does_not_block_another() -> Result<()> {
    let client = Arc::new(MockPushClient::new());
    client.script_endpoint("slow", vec![MockOutcome::retryable(), MockOutcome::retryable()]);
    let session = Arc::new(RecordingSession::new());
    let policy = RetryPolicy::new(3, Duration::from_secs(30), Duration::from_secs(30));
    let cancel = CancellationToken::new();
    let mut router = PartitionRouter::new(
        processor(client.clone(), policy, true),
        session.clone(),
        8,
        cancel.clone(),
    );

    router.dispatch(RecordBuilder::new().partition(0).offset(1).message("slow", "x").build()).await?;
    router.dispatch(RecordBuilder::new().partition(1).offset(7).message("fast", "y").build()).await?;

    tokio::time::timeout(Duration::from_secs(5), async {
        while !session.is_marked(7) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;

    assert!(!session.is_marked(1), "partition 0 should still be in backoff");

    cancel.cancel();
    let summaries = router.shutdown(Duration::from_secs(5)).await;

    let (_, slow) = summaries.iter().find(|(key, _)| key.partition == 0).unwrap();
    assert!(slow.interrupted);
    assert_eq!(session.marked_offsets(), vec![7]);
    Ok(())
}

#[tokio::test]
async fn shutdown_aborts_loops_that_overrun_the_timeout() {
    let client = Arc::new(MockPushClient::scripted(vec![MockOutcome::Hang]));
    let session = Arc::new(RecordingSession::new());
    let mut router = PartitionRouter::new(
        processor(client.clone(), RetryPolicy::default(), false),
        session.clone(),
        4,
        CancellationToken::new(),
    );

    router.dispatch(RecordBuilder::new().build()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let summaries = router.shutdown(Duration::from_millis(50)).await;

    assert!(summaries.is_empty());
    assert!(session.marked().is_empty());
    assert_eq!(client.call_count(), 1);
}

#[derive(Debug)]
struct PanickingHandler;

#[async_trait::async_trait]
impl EventHandler for PanickingHandler {
    async fn handle_event(&self, _event: ProcessingEvent) {
        panic!("event handler failed");
    }
}

#[tokio::test]
async fn dead_claim_loop_is_never_replaced() -> Result<()> {
    let engine = RetryEngine::new(
        Arc::new(MockPushClient::new()),
        RetryPolicy::default(),
        Arc::new(TestClock::new()),
    )?;
    let session = Arc::new(RecordingSession::new());
    let mut router = PartitionRouter::new(
        ClaimProcessor::new(engine, Arc::new(PanickingHandler)),
        session.clone(),
        1,
        CancellationToken::new(),
    );

    router.dispatch(RecordBuilder::new().offset(0).build()).await?;

    let mut offset = 1;
    let stopped = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Err(e) = router.dispatch(RecordBuilder::new().offset(offset).build()).await {
                break e;
            }
            offset += 1;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await?;
    assert!(matches!(stopped, RouterError::ClaimStopped { .. }));

    for later in offset + 1..offset + 4 {
        let result = router.dispatch(RecordBuilder::new().offset(later).build()).await;
        assert!(matches!(result, Err(RouterError::ClaimStopped { .. })));
    }
    assert_eq!(router.active_claims(), 1);

    let summaries = router.shutdown(Duration::from_secs(5)).await;

    assert!(summaries.is_empty());
    assert!(session.marked().is_empty());
    Ok(())
}
