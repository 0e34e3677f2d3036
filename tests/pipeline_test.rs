//! End-to-end tests for the record pipeline.
//!
//! Records flow through the partition router and claim processor into the
//! real push client, which talks to a mock HTTP server. Offsets land in a
//! recording session instead of a broker.

#![allow(clippy::unwrap_used)]

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use pushbridge_core::{Clock, ProcessingEvent};
use pushbridge_delivery::{ClaimProcessor, RetryEngine, RetryPolicy, SnsClient, SnsConfig};
use pushbridge_kafka::PartitionRouter;
use pushbridge_testing::{CollectingEventHandler, RecordBuilder, RecordingSession, TestClock};
use tokio_util::sync::CancellationToken;
use wiremock::{
    matchers::{body_string_contains, method},
    Mock, MockServer, ResponseTemplate,
};

fn publish_ok(id: &str) -> String {
    format!(
        "<PublishResponse><PublishResult><MessageId>{id}</MessageId></PublishResult>\
         </PublishResponse>"
    )
}

fn error_body(code: &str) -> String {
    format!(
        "<ErrorResponse><Error><Type>Sender</Type><Code>{code}</Code>\
         <Message>{code} happened</Message></Error></ErrorResponse>"
    )
}

struct Pipeline {
    router: PartitionRouter,
    session: Arc<RecordingSession>,
    events: Arc<CollectingEventHandler>,
    clock: TestClock,
}

async fn pipeline(server: &MockServer, policy: RetryPolicy) -> Pipeline {
    let clock = TestClock::new();
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());

    let config = SnsConfig {
        endpoint: server.uri(),
        access_key_id: "AKIDEXAMPLE".to_string(),
        secret_access_key: "secret".to_string(),
        timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let client = SnsClient::new(config, shared.clone()).await.unwrap();
    let engine = RetryEngine::new(Arc::new(client), policy, shared).unwrap();

    let events = Arc::new(CollectingEventHandler::new());
    let session = Arc::new(RecordingSession::new());
    let router = PartitionRouter::new(
        ClaimProcessor::new(engine, events.clone()),
        session.clone(),
        16,
        CancellationToken::new(),
    );

    Pipeline { router, session, events, clock }
}

#[tokio::test]
async fn mixed_records_all_advance_in_order() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("TargetArn=flaky&"))
        .respond_with(ResponseTemplate::new(503).set_body_string(error_body("ServiceUnavailable")))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("TargetArn=disabled&"))
        .respond_with(ResponseTemplate::new(400).set_body_string(error_body("EndpointDisabled")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(publish_ok("m-ok")))
        .mount(&server)
        .await;

    let Pipeline { mut router, session, events, clock } =
        pipeline(&server, RetryPolicy::default()).await;

    let records = [
        RecordBuilder::new().offset(10).message("ok", "first").build(),
        RecordBuilder::new().offset(11).raw(&b"{broken"[..]).build(),
        RecordBuilder::new().offset(12).message("flaky", "second").build(),
        RecordBuilder::new().offset(13).message("disabled", "third").build(),
        RecordBuilder::new().offset(14).message("ok", "fourth").build(),
    ];
    for record in records {
        router.dispatch(record).await?;
    }

    let summaries = router.shutdown(Duration::from_secs(10)).await;

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].1.advanced, 5);
    assert_eq!(session.marked_offsets(), vec![10, 11, 12, 13, 14]);

    assert_eq!(events.delivered(), 3);
    assert_eq!(events.rejected(), 1);
    assert_eq!(events.failed(), 1);
    assert_eq!(clock.recorded_sleeps(), vec![Duration::from_secs(1), Duration::from_secs(2)]);

    let flaky = events
        .events()
        .into_iter()
        .find_map(|event| match event {
            ProcessingEvent::Delivered(e) if e.origin.offset == 12 => Some(e),
            _ => None,
        })
        .unwrap();
    assert_eq!(flaky.attempts, 3);
    assert_eq!(flaky.message_id, "m-ok");
    Ok(())
}

#[tokio::test]
async fn throttling_exhausts_retries_and_advances() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string(error_body("Throttling")))
        .expect(3)
        .mount(&server)
        .await;

    let Pipeline { mut router, session, events, .. } =
        pipeline(&server, RetryPolicy::default()).await;

    router.dispatch(RecordBuilder::new().offset(7).build()).await?;
    router.shutdown(Duration::from_secs(10)).await;

    assert_eq!(session.marked_offsets(), vec![7]);
    match &events.events()[..] {
        [ProcessingEvent::Failed(e)] => {
            assert!(e.exhausted);
            assert_eq!(e.attempts, 3);
            assert_eq!(e.error_kind, "Throttled");
        },
        other => panic!("unexpected events: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn invalid_records_never_reach_the_api() -> Result<()> {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(publish_ok("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let Pipeline { mut router, session, events, .. } =
        pipeline(&server, RetryPolicy::default()).await;

    router.dispatch(RecordBuilder::new().offset(0).raw(&b"not json"[..]).build()).await?;
    router.dispatch(RecordBuilder::new().offset(1).message("", "no endpoint").build()).await?;
    router.dispatch(RecordBuilder::new().offset(2).message("ep1", "").build()).await?;
    router.shutdown(Duration::from_secs(5)).await;

    assert_eq!(session.marked_offsets(), vec![0, 1, 2]);
    assert_eq!(events.rejected(), 3);
    Ok(())
}
