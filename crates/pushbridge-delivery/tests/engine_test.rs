//! Integration tests for the delivery retry engine.
//!
//! Covers the terminal states of a single delivery: success, fatal stop,
//! exhausted retries and cancellation, plus the backoff waits between
//! attempts as observed through the test clock.

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::{sync::Arc, time::Duration};

use pushbridge_core::{OutboundMessage, RealClock};
use pushbridge_delivery::{DeliveryError, PushErrorKind, RetryEngine, RetryPolicy};
use pushbridge_testing::{MockOutcome, MockPushClient, TestClock};
use tokio_util::sync::CancellationToken;

fn policy() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(100), Duration::from_secs(1))
}

fn setup(outcomes: Vec<MockOutcome>) -> (RetryEngine, Arc<MockPushClient>, TestClock) {
    let client = Arc::new(MockPushClient::scripted(outcomes));
    let clock = TestClock::new();
    let engine = RetryEngine::new(client.clone(), policy(), Arc::new(clock.clone())).unwrap();
    (engine, client, clock)
}

fn message() -> OutboundMessage {
    OutboundMessage::new("ep1", "hello")
}

#[tokio::test]
async fn first_attempt_success_does_not_wait() {
    let (engine, client, clock) = setup(vec![MockOutcome::Delivered("m-1".to_string())]);

    let id = engine.deliver(&message(), &CancellationToken::new()).await.unwrap();

    assert_eq!(id, "m-1");
    assert_eq!(client.call_count(), 1);
    assert!(clock.recorded_sleeps().is_empty());
}

#[tokio::test]
async fn retryable_failures_back_off_then_succeed() {
    let (engine, client, clock) = setup(vec![
        MockOutcome::retryable(),
        MockOutcome::code("Throttling"),
        MockOutcome::Delivered("m-3".to_string()),
    ]);

    let id = engine.deliver(&message(), &CancellationToken::new()).await.unwrap();

    assert_eq!(id, "m-3");
    assert_eq!(client.call_count(), 3);
    assert_eq!(
        clock.recorded_sleeps(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
}

#[tokio::test]
async fn backoff_waits_are_capped() {
    let client = Arc::new(MockPushClient::scripted(vec![
        MockOutcome::retryable(),
        MockOutcome::retryable(),
        MockOutcome::retryable(),
        MockOutcome::retryable(),
    ]));
    let clock = TestClock::new();
    let policy = RetryPolicy::new(5, Duration::from_millis(400), Duration::from_secs(1));
    let engine = RetryEngine::new(client.clone(), policy, Arc::new(clock.clone())).unwrap();

    engine.deliver(&message(), &CancellationToken::new()).await.unwrap();

    assert_eq!(
        clock.recorded_sleeps(),
        vec![
            Duration::from_millis(400),
            Duration::from_millis(800),
            Duration::from_secs(1),
            Duration::from_secs(1),
        ]
    );
}

#[tokio::test]
async fn exhausted_retries_report_last_error_and_attempts() {
    let (engine, client, clock) = setup(vec![
        MockOutcome::retryable(),
        MockOutcome::retryable(),
        MockOutcome::code("InternalError"),
        MockOutcome::Delivered("never".to_string()),
    ]);

    let error = engine.deliver(&message(), &CancellationToken::new()).await.unwrap_err();

    match error {
        DeliveryError::RetriesExhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.kind, PushErrorKind::InternalError);
        },
        other => panic!("expected exhausted retries, got {other:?}"),
    }
    assert_eq!(client.call_count(), 3);
    assert_eq!(clock.recorded_sleeps().len(), 2);
}

#[tokio::test]
async fn fatal_error_stops_immediately() {
    let (engine, client, clock) = setup(vec![MockOutcome::fatal(), MockOutcome::retryable()]);

    let error = engine.deliver(&message(), &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(error, DeliveryError::Fatal(ref e) if e.kind == PushErrorKind::EndpointDisabled));
    assert_eq!(client.call_count(), 1);
    assert!(clock.recorded_sleeps().is_empty());
}

#[tokio::test]
async fn fatal_after_retry_keeps_remaining_budget_unused() {
    let (engine, client, _clock) = setup(vec![
        MockOutcome::retryable(),
        MockOutcome::code("InvalidParameter"),
        MockOutcome::Delivered("never".to_string()),
    ]);

    let error = engine.deliver(&message(), &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(error, DeliveryError::Fatal(_)));
    assert_eq!(client.call_count(), 2);
}

#[tokio::test]
async fn single_attempt_policy_never_sleeps() {
    let client = Arc::new(MockPushClient::scripted(vec![MockOutcome::retryable()]));
    let clock = TestClock::new();
    let policy = RetryPolicy::new(1, Duration::from_millis(100), Duration::from_millis(100));
    let engine = RetryEngine::new(client.clone(), policy, Arc::new(clock.clone())).unwrap();

    let error = engine.deliver(&message(), &CancellationToken::new()).await.unwrap_err();

    assert_eq!(error.attempts(), Some(1));
    assert_eq!(client.call_count(), 1);
    assert!(clock.recorded_sleeps().is_empty());
}

#[tokio::test]
async fn cancellation_aborts_backoff_wait() {
    let client = Arc::new(MockPushClient::scripted(vec![MockOutcome::retryable()]));
    let policy = RetryPolicy::new(3, Duration::from_secs(60), Duration::from_secs(60));
    let engine = RetryEngine::new(client.clone(), policy, Arc::new(RealClock::new())).unwrap();
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result =
        tokio::time::timeout(Duration::from_secs(5), engine.deliver(&message(), &cancel)).await;

    let error = result.expect("cancellation should interrupt the 60s backoff").unwrap_err();
    assert!(error.is_cancelled());
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn cancellation_aborts_in_flight_publish() {
    let (engine, client, _clock) = setup(vec![MockOutcome::Hang]);
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let result =
        tokio::time::timeout(Duration::from_secs(5), engine.deliver(&message(), &cancel)).await;

    assert!(matches!(result, Ok(Err(DeliveryError::Cancelled))));
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn request_carries_message_fields() {
    let (engine, client, _clock) = setup(Vec::new());
    let message = OutboundMessage::new("arn:endpoint/1", "body text")
        .with_title("Title")
        .with_data("order", 7);

    engine.deliver(&message, &CancellationToken::new()).await.unwrap();

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].target_endpoint, "arn:endpoint/1");
    assert_eq!(requests[0].title, "Title");
    assert_eq!(requests[0].body, "body text");
    assert_eq!(requests[0].data.as_ref().unwrap()["order"], 7);
}
