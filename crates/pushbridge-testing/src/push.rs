//! Scripted push client.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use pushbridge_delivery::{PublishRequest, PushClient, PushError, PushErrorKind};

/// What a scripted publish call does.
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Succeed with the given message id.
    Delivered(String),
    /// Fail with the given error.
    Fail(PushError),
    /// Never complete. Used to exercise cancellation of in-flight calls.
    Hang,
}

impl MockOutcome {
    /// Failure classified as retryable (`ServiceUnavailable`).
    pub fn retryable() -> Self {
        Self::Fail(PushError::new(PushErrorKind::ServiceUnavailable, "service unavailable"))
    }

    /// Failure classified as fatal (`EndpointDisabled`).
    pub fn fatal() -> Self {
        Self::Fail(PushError::new(PushErrorKind::EndpointDisabled, "endpoint is disabled"))
    }

    /// Failure with an arbitrary API error code.
    pub fn code(code: &str) -> Self {
        Self::Fail(PushError::from_code(code, format!("{code} from mock")))
    }
}

#[derive(Debug, Default)]
struct Script {
    default: VecDeque<MockOutcome>,
    per_endpoint: HashMap<String, VecDeque<MockOutcome>>,
    requests: Vec<PublishRequest>,
}

/// [`PushClient`] that replays scripted outcomes and records every call.
///
/// Outcomes scripted for a specific endpoint are used first, then the
/// default script. Once both are empty every call succeeds with a generated
/// `msg-N` identifier.
#[derive(Debug, Default)]
pub struct MockPushClient {
    script: Mutex<Script>,
    next_id: AtomicU64,
}

impl MockPushClient {
    /// Creates a client that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that replays `outcomes` for any endpoint.
    pub fn scripted(outcomes: impl IntoIterator<Item = MockOutcome>) -> Self {
        let client = Self::new();
        client.push_outcomes(outcomes);
        client
    }

    /// Appends outcomes to the default script.
    pub fn push_outcomes(&self, outcomes: impl IntoIterator<Item = MockOutcome>) {
        if let Ok(mut script) = self.script.lock() {
            script.default.extend(outcomes);
        }
    }

    /// Appends outcomes used only for `endpoint`.
    pub fn script_endpoint(
        &self,
        endpoint: impl Into<String>,
        outcomes: impl IntoIterator<Item = MockOutcome>,
    ) {
        if let Ok(mut script) = self.script.lock() {
            script.per_endpoint.entry(endpoint.into()).or_default().extend(outcomes);
        }
    }

    /// Total publish calls made.
    pub fn call_count(&self) -> usize {
        self.script.lock().map(|script| script.requests.len()).unwrap_or_default()
    }

    /// Publish calls made for `endpoint`.
    pub fn calls_for(&self, endpoint: &str) -> usize {
        self.script
            .lock()
            .map(|script| {
                script.requests.iter().filter(|r| r.target_endpoint == endpoint).count()
            })
            .unwrap_or_default()
    }

    /// Every request received, in call order.
    pub fn requests(&self) -> Vec<PublishRequest> {
        self.script.lock().map(|script| script.requests.clone()).unwrap_or_default()
    }

    fn next_outcome(&self, request: &PublishRequest) -> MockOutcome {
        let scripted = self.script.lock().ok().and_then(|mut script| {
            script.requests.push(request.clone());
            let from_endpoint = script
                .per_endpoint
                .get_mut(&request.target_endpoint)
                .and_then(VecDeque::pop_front);
            from_endpoint.or_else(|| script.default.pop_front())
        });

        scripted.unwrap_or_else(|| {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            MockOutcome::Delivered(format!("msg-{id}"))
        })
    }
}

#[async_trait::async_trait]
impl PushClient for MockPushClient {
    async fn publish(&self, request: &PublishRequest) -> Result<String, PushError> {
        match self.next_outcome(request) {
            MockOutcome::Delivered(id) => Ok(id),
            MockOutcome::Fail(error) => Err(error),
            MockOutcome::Hang => std::future::pending().await,
        }
    }
}
