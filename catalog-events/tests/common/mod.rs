#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use catalog_events::{Envelope, EventProducer, MetricsSink, ProducerError};
use common_kafka::{ConsumedMessage, MessageReader, TransportError};

#[derive(Default)]
pub struct CountingMetrics {
    pub produced: AtomicU64,
    pub produce_errors: AtomicU64,
    pub dropped: AtomicU64,
    pub consumed: AtomicU64,
    pub commit_errors: AtomicU64,
}

impl CountingMetrics {
    pub fn produced_count(&self) -> u64 {
        self.produced.load(Ordering::SeqCst)
    }

    pub fn produce_error_count(&self) -> u64 {
        self.produce_errors.load(Ordering::SeqCst)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn consumed_count(&self) -> u64 {
        self.consumed.load(Ordering::SeqCst)
    }

    pub fn commit_error_count(&self) -> u64 {
        self.commit_errors.load(Ordering::SeqCst)
    }
}

impl MetricsSink for CountingMetrics {
    fn produced(&self) {
        self.produced.fetch_add(1, Ordering::SeqCst);
    }

    fn produce_error(&self) {
        self.produce_errors.fetch_add(1, Ordering::SeqCst);
    }

    fn dropped(&self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }

    fn consumed(&self, _topic: &str) {
        self.consumed.fetch_add(1, Ordering::SeqCst);
    }

    fn commit_error(&self, _topic: &str) {
        self.commit_errors.fetch_add(1, Ordering::SeqCst);
    }
}

/// Records every envelope it is asked to publish. With a gate, each call
/// waits for a permit before completing.
#[derive(Default)]
pub struct RecordingProducer {
    pub received: Mutex<Vec<Envelope>>,
    pub gate: Option<Arc<Semaphore>>,
    pub fail_topic: Option<String>,
    pub panic_topic: Option<String>,
    pub fail_close: bool,
    pub closed: AtomicBool,
    pub close_calls: AtomicUsize,
    pub received_after_close: AtomicUsize,
}

impl RecordingProducer {
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Default::default()
        }
    }

    pub fn failing_on(topic: &str) -> Self {
        Self {
            fail_topic: Some(topic.to_string()),
            ..Default::default()
        }
    }

    /// Panics on `topic` and fails its own close.
    pub fn panicking_on(topic: &str) -> Self {
        Self {
            panic_topic: Some(topic.to_string()),
            fail_close: true,
            ..Default::default()
        }
    }

    pub fn received(&self) -> Vec<Envelope> {
        self.received.lock().clone()
    }
}

#[async_trait]
impl EventProducer for RecordingProducer {
    async fn produce(&self, topic: &str, key: &[u8], value: &[u8]) -> Result<(), ProducerError> {
        if self.panic_topic.as_deref() == Some(topic) {
            panic!("publishing to {topic} blew up");
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if self.closed.load(Ordering::SeqCst) {
            self.received_after_close.fetch_add(1, Ordering::SeqCst);
        }
        self.received.lock().push(Envelope {
            topic: topic.to_string(),
            key: key.to_vec().into(),
            value: value.to_vec().into(),
        });

        match &self.fail_topic {
            Some(fail) if fail == topic => Err(ProducerError::Delivery(TransportError::Closed)),
            _ => Ok(()),
        }
    }

    fn close(&self) -> Result<(), ProducerError> {
        self.closed.store(true, Ordering::SeqCst);
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(ProducerError::Close(TransportError::Closed));
        }
        Ok(())
    }
}

/// Serves scripted fetch results, then blocks until cancellation. Clones
/// share state so tests can inspect a reader owned by a consumer.
#[derive(Clone)]
pub struct ScriptedReader {
    state: Arc<ReaderState>,
}

struct ReaderState {
    script: Mutex<VecDeque<Result<ConsumedMessage, TransportError>>>,
    fail_commits: bool,
    events: Mutex<Vec<String>>,
    blocked: Notify,
    closed: AtomicBool,
}

impl ScriptedReader {
    pub fn new(
        script: Vec<Result<ConsumedMessage, TransportError>>,
        fail_commits: bool,
    ) -> Self {
        Self {
            state: Arc::new(ReaderState {
                script: Mutex::new(script.into()),
                fail_commits,
                events: Mutex::new(Vec::new()),
                blocked: Notify::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.state.events.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// Resolves once a fetch is parked waiting for cancellation.
    pub async fn wait_until_blocked(&self) {
        self.state.blocked.notified().await
    }
}

#[async_trait]
impl MessageReader for ScriptedReader {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<ConsumedMessage, TransportError> {
        let next = self.state.script.lock().pop_front();
        if let Some(result) = next {
            match &result {
                Ok(message) => self
                    .state
                    .events
                    .lock()
                    .push(format!("fetch {}", message.offset)),
                Err(_) => self.state.events.lock().push("fetch error".to_string()),
            }
            return result;
        }

        self.state.events.lock().push("fetch blocked".to_string());
        // notify_one stores a permit, so a waiter that arrives late still wakes
        self.state.blocked.notify_one();
        cancel.cancelled().await;
        Err(TransportError::Canceled)
    }

    async fn commit(&self, message: &ConsumedMessage) -> Result<(), TransportError> {
        self.state
            .events
            .lock()
            .push(format!("commit {}", message.offset));
        if self.state.fail_commits {
            Err(TransportError::Timeout(Duration::from_millis(5)))
        } else {
            Ok(())
        }
    }

    fn close(&self) {
        self.state.closed.store(true, Ordering::SeqCst);
    }
}

pub fn message(topic: &str, offset: i64, payload: &str) -> ConsumedMessage {
    ConsumedMessage {
        topic: topic.to_string(),
        partition: 0,
        offset,
        key: Some(format!("key-{offset}").into()),
        payload: Some(payload.to_string().into()),
    }
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
