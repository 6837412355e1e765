use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use common_kafka::config::ConsumerConfig;
use common_kafka::kafka_consumer::KafkaReader;
use common_kafka::{ConsumedMessage, MessageReader};
use rdkafka::error::KafkaError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics::MetricsSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Running,
    Stopped,
}

const RUNNING: u8 = 0;
const STOPPED: u8 = 1;

/// Poll loop for one (topic, group). Each message is logged and then its
/// offset is committed, so a crash between the two replays the message.
pub struct Consumer<R: MessageReader> {
    reader: R,
    topic: String,
    metrics: Arc<dyn MetricsSink>,
    state: AtomicU8,
    started: AtomicBool,
}

impl Consumer<KafkaReader> {
    pub fn from_config(
        config: &ConsumerConfig,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, KafkaError> {
        let reader = KafkaReader::new(config)?;
        Ok(Self::new(reader, &config.kafka_consumer_topic, metrics))
    }
}

impl<R: MessageReader> Consumer<R> {
    pub fn new(reader: R, topic: &str, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            reader,
            topic: topic.to_owned(),
            metrics,
            state: AtomicU8::new(RUNNING),
            started: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ConsumerState {
        match self.state.load(Ordering::SeqCst) {
            RUNNING => ConsumerState::Running,
            _ => ConsumerState::Stopped,
        }
    }

    /// Runs until `cancel` fires. An in-flight fetch is never interrupted by
    /// this loop; cancellation is observed once the fetch returns. The loop
    /// runs at most once per consumer, later calls return immediately.
    pub async fn consume_messages(&self, cancel: &CancellationToken) {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(topic = %self.topic, "consumer loop already started");
            return;
        }
        info!(topic = %self.topic, "starting consumer");

        loop {
            let message = match self.reader.fetch(cancel).await {
                Ok(message) => message,
                Err(e) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    warn!(topic = %self.topic, "failed to fetch message: {}", e);
                    continue;
                }
            };

            self.handle(&message);

            if let Err(e) = self.reader.commit(&message).await {
                self.metrics.commit_error(&self.topic);
                warn!(
                    topic = %self.topic,
                    partition = message.partition,
                    offset = message.offset,
                    "failed to commit offset: {}",
                    e
                );
            }
        }

        self.state.store(STOPPED, Ordering::SeqCst);
        info!(topic = %self.topic, "consumer stopped");
    }

    fn handle(&self, message: &ConsumedMessage) {
        let key = message
            .key
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_default();
        let payload = message
            .payload
            .as_deref()
            .map(String::from_utf8_lossy)
            .unwrap_or_default();

        info!(
            topic = %message.topic,
            partition = message.partition,
            offset = message.offset,
            "received message key={} value={}",
            key,
            payload
        );
        self.metrics.consumed(&self.topic);
    }

    pub fn close(&self) {
        self.reader.close();
    }
}
