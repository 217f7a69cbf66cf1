// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock cloud provider for testing.
//!
//! A provider that simulates role assumption and resource calls in memory,
//! recording every call so tests can assert on what the activities did.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::*;

/// A function invocation seen by the mock.
#[derive(Debug, Clone)]
pub struct RecordedInvocation {
    /// Tenant whose session made the call
    pub tenant_id: String,
    /// Function name or ARN
    pub function_name: String,
    /// Payload sent to the function
    pub payload: Vec<u8>,
}

/// An object written through the mock.
#[derive(Debug, Clone)]
pub struct StoredObject {
    /// Tenant whose session made the call
    pub tenant_id: String,
    /// Bucket name
    pub bucket: String,
    /// Object key
    pub key: String,
    /// Object body
    pub body: Vec<u8>,
}

/// A topic or queue message seen by the mock.
#[derive(Debug, Clone)]
pub struct SentMessage {
    /// Tenant whose session made the call
    pub tenant_id: String,
    /// Topic ARN or queue URL
    pub target: String,
    /// Message body
    pub body: String,
    /// Id returned to the caller
    pub message_id: String,
}

#[derive(Default)]
struct MockState {
    assume_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    assumed_tenants: Mutex<Vec<String>>,
    failing_tenants: Mutex<HashSet<String>>,
    responses: Mutex<HashMap<String, std::result::Result<InvokeOutput, String>>>,
    invocations: Mutex<Vec<RecordedInvocation>>,
    objects: Mutex<Vec<StoredObject>>,
    published: Mutex<Vec<SentMessage>>,
    queued: Mutex<Vec<SentMessage>>,
    fail_object_writes: AtomicBool,
    fail_messaging: AtomicBool,
    message_counter: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockState {
    fn next_message_id(&self) -> String {
        let n = self.message_counter.fetch_add(1, Ordering::SeqCst) + 1;
        format!("mock-msg-{n}")
    }
}

/// Mock cloud provider for testing.
pub struct MockCloud {
    state: Arc<MockState>,
    /// Simulated latency of role assumption (in milliseconds)
    pub assume_delay_ms: u64,
}

impl Default for MockCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCloud {
    /// Create a mock where every call succeeds.
    ///
    /// Functions without a scripted response echo their input back as
    /// `{"result": <block_input>, "backpack": <backpack>}`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
            assume_delay_ms: 0,
        }
    }

    /// Simulate slow role assumption.
    pub fn with_assume_delay_ms(mut self, delay_ms: u64) -> Self {
        self.assume_delay_ms = delay_ms;
        self
    }

    /// Make role assumption fail for `tenant_id`.
    pub fn fail_assume_for(&self, tenant_id: &str) {
        lock(&self.state.failing_tenants).insert(tenant_id.to_string());
    }

    /// Let role assumption succeed again for `tenant_id`.
    pub fn allow_assume_for(&self, tenant_id: &str) {
        lock(&self.state.failing_tenants).remove(tenant_id);
    }

    /// Script the output of every invocation of `function_name`.
    pub fn respond_with(&self, function_name: &str, output: InvokeOutput) {
        lock(&self.state.responses).insert(function_name.to_string(), Ok(output));
    }

    /// Script a 200 response with the given payload and no log tail.
    pub fn respond_with_payload(&self, function_name: &str, payload: &str) {
        self.respond_with(
            function_name,
            InvokeOutput {
                status_code: 200,
                payload: payload.as_bytes().to_vec(),
                function_error: None,
                log_result: None,
            },
        );
    }

    /// Make every invocation of `function_name` fail at the transport level.
    pub fn fail_invocations_of(&self, function_name: &str, message: &str) {
        lock(&self.state.responses).insert(function_name.to_string(), Err(message.to_string()));
    }

    /// Make object writes fail.
    pub fn fail_object_writes(&self, fail: bool) {
        self.state.fail_object_writes.store(fail, Ordering::SeqCst);
    }

    /// Make topic publishes and queue sends fail.
    pub fn fail_messaging(&self, fail: bool) {
        self.state.fail_messaging.store(fail, Ordering::SeqCst);
    }

    /// Number of role assumptions attempted so far.
    pub fn assume_calls(&self) -> usize {
        self.state.assume_calls.load(Ordering::SeqCst)
    }

    /// Highest number of role assumptions that were in flight at once.
    pub fn max_concurrent_assumptions(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Tenants passed to `assume_role`, in call order.
    pub fn assumed_tenants(&self) -> Vec<String> {
        lock(&self.state.assumed_tenants).clone()
    }

    /// Function invocations, in call order.
    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        lock(&self.state.invocations).clone()
    }

    /// Objects written, in call order.
    pub fn objects(&self) -> Vec<StoredObject> {
        lock(&self.state.objects).clone()
    }

    /// Topic messages, in call order.
    pub fn published(&self) -> Vec<SentMessage> {
        lock(&self.state.published).clone()
    }

    /// Queue messages, in call order.
    pub fn queued(&self) -> Vec<SentMessage> {
        lock(&self.state.queued).clone()
    }
}

#[async_trait]
impl CloudProvider for MockCloud {
    fn provider_type(&self) -> &'static str {
        "mock"
    }

    async fn assume_role(
        &self,
        tenant_id: &str,
        duration: Duration,
    ) -> std::result::Result<DelegatedSession, CloudError> {
        let state = &self.state;
        state.assume_calls.fetch_add(1, Ordering::SeqCst);
        lock(&state.assumed_tenants).push(tenant_id.to_string());

        let now_in_flight = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if self.assume_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.assume_delay_ms)).await;
        }

        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        if lock(&state.failing_tenants).contains(tenant_id) {
            return Err(CloudError::Service {
                service: "sts",
                status: 403,
                code: "AccessDenied".to_string(),
                message: format!("mock refused to assume role in {tenant_id}"),
            });
        }

        let expiration = Utc::now()
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::hours(1));

        Ok(DelegatedSession {
            tenant_id: tenant_id.to_string(),
            region: "mock-region-1".to_string(),
            credentials: Credentials {
                access_key_id: format!("ASIAMOCK{tenant_id}"),
                secret_access_key: "mock-secret".to_string(),
                session_token: Some("mock-token".to_string()),
            },
            expiration,
        })
    }

    fn function_client(
        &self,
        session: DelegatedSession,
    ) -> std::result::Result<Arc<dyn FunctionClient>, CloudError> {
        Ok(Arc::new(MockClient {
            tenant_id: session.tenant_id,
            state: self.state.clone(),
        }))
    }

    fn object_store(
        &self,
        session: DelegatedSession,
    ) -> std::result::Result<Arc<dyn ObjectStore>, CloudError> {
        Ok(Arc::new(MockClient {
            tenant_id: session.tenant_id,
            state: self.state.clone(),
        }))
    }

    fn topic_client(
        &self,
        session: DelegatedSession,
    ) -> std::result::Result<Arc<dyn TopicClient>, CloudError> {
        Ok(Arc::new(MockClient {
            tenant_id: session.tenant_id,
            state: self.state.clone(),
        }))
    }

    fn queue_client(
        &self,
        session: DelegatedSession,
    ) -> std::result::Result<Arc<dyn QueueClient>, CloudError> {
        Ok(Arc::new(MockClient {
            tenant_id: session.tenant_id,
            state: self.state.clone(),
        }))
    }
}

/// One struct backs all four client traits; the trait object decides which
/// calls are reachable.
struct MockClient {
    tenant_id: String,
    state: Arc<MockState>,
}

fn echo(payload: &[u8]) -> Vec<u8> {
    let input: serde_json::Value = serde_json::from_slice(payload).unwrap_or_default();
    serde_json::json!({
        "result": input.get("block_input").cloned().unwrap_or_default(),
        "backpack": input.get("backpack").cloned().unwrap_or_default(),
    })
    .to_string()
    .into_bytes()
}

#[async_trait]
impl FunctionClient for MockClient {
    async fn invoke(
        &self,
        function_name: &str,
        payload: Vec<u8>,
    ) -> std::result::Result<InvokeOutput, CloudError> {
        lock(&self.state.invocations).push(RecordedInvocation {
            tenant_id: self.tenant_id.clone(),
            function_name: function_name.to_string(),
            payload: payload.clone(),
        });

        match lock(&self.state.responses).get(function_name) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(message)) => Err(CloudError::Http(message.clone())),
            None => Ok(InvokeOutput {
                status_code: 200,
                payload: echo(&payload),
                function_error: None,
                log_result: None,
            }),
        }
    }
}

#[async_trait]
impl ObjectStore for MockClient {
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
    ) -> std::result::Result<(), CloudError> {
        if self.state.fail_object_writes.load(Ordering::SeqCst) {
            return Err(CloudError::Service {
                service: "s3",
                status: 503,
                code: "SlowDown".to_string(),
                message: "mock object store unavailable".to_string(),
            });
        }
        lock(&self.state.objects).push(StoredObject {
            tenant_id: self.tenant_id.clone(),
            bucket: bucket.to_string(),
            key: key.to_string(),
            body,
        });
        Ok(())
    }
}

#[async_trait]
impl TopicClient for MockClient {
    async fn publish(
        &self,
        topic_arn: &str,
        message: &str,
    ) -> std::result::Result<String, CloudError> {
        if self.state.fail_messaging.load(Ordering::SeqCst) {
            return Err(CloudError::Http("mock topic unreachable".to_string()));
        }
        let message_id = self.state.next_message_id();
        lock(&self.state.published).push(SentMessage {
            tenant_id: self.tenant_id.clone(),
            target: topic_arn.to_string(),
            body: message.to_string(),
            message_id: message_id.clone(),
        });
        Ok(message_id)
    }
}

#[async_trait]
impl QueueClient for MockClient {
    async fn send_message(
        &self,
        queue_url: &str,
        body: &str,
    ) -> std::result::Result<String, CloudError> {
        if self.state.fail_messaging.load(Ordering::SeqCst) {
            return Err(CloudError::Http("mock queue unreachable".to_string()));
        }
        let message_id = self.state.next_message_id();
        lock(&self.state.queued).push(SentMessage {
            tenant_id: self.tenant_id.clone(),
            target: queue_url.to_string(),
            body: body.to_string(),
            message_id: message_id.clone(),
        });
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_assume_role_success() {
        let cloud = MockCloud::new();
        let session = cloud
            .assume_role("111122223333", Duration::from_secs(900))
            .await
            .unwrap();

        assert_eq!(session.tenant_id, "111122223333");
        assert!(session.credentials.session_token.is_some());
        assert_eq!(cloud.assume_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_assume_role_failure() {
        let cloud = MockCloud::new();
        cloud.fail_assume_for("111122223333");

        let result = cloud
            .assume_role("111122223333", Duration::from_secs(900))
            .await;

        assert!(matches!(result, Err(CloudError::Service { status: 403, .. })));
        assert_eq!(cloud.assume_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_function_echoes_input() {
        let cloud = MockCloud::new();
        let session = cloud
            .assume_role("111122223333", Duration::from_secs(900))
            .await
            .unwrap();
        let client = cloud.function_client(session).unwrap();

        let output = client
            .invoke("fn", br#"{"block_input":{"a":1},"backpack":{"b":2}}"#.to_vec())
            .await
            .unwrap();
        let echoed: serde_json::Value = serde_json::from_slice(&output.payload).unwrap();

        assert_eq!(echoed["result"], serde_json::json!({"a": 1}));
        assert_eq!(echoed["backpack"], serde_json::json!({"b": 2}));
        assert_eq!(cloud.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_message_ids_are_unique() {
        let cloud = MockCloud::new();
        let session = cloud
            .assume_role("111122223333", Duration::from_secs(900))
            .await
            .unwrap();
        let topic = cloud.topic_client(session.clone()).unwrap();
        let queue = cloud.queue_client(session).unwrap();

        let first = topic.publish("arn:aws:sns:us-west-2:1:t", "hello").await.unwrap();
        let second = queue.send_message("https://sqs/1/q", "hello").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(cloud.published().len(), 1);
        assert_eq!(cloud.queued().len(), 1);
    }
}
