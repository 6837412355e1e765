use async_trait::async_trait;
use bytes::Bytes;
use rdkafka::{
    consumer::{CommitMode, Consumer, StreamConsumer},
    error::KafkaError,
    ClientConfig, Message, Offset, TopicPartitionList,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ConsumerConfig;
use crate::transport::{ConsumedMessage, MessageReader, TransportError};

/// Reads one topic for one consumer group. Offsets are only ever committed
/// explicitly through `commit`.
pub struct KafkaReader {
    consumer: StreamConsumer,
    topic: String,
}

impl KafkaReader {
    pub fn new(config: &ConsumerConfig) -> Result<Self, KafkaError> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka_hosts)
            .set("group.id", &config.kafka_consumer_group)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", &config.kafka_consumer_offset_reset)
            .set("fetch.min.bytes", config.kafka_consumer_min_bytes.to_string())
            .set(
                "max.partition.fetch.bytes",
                config.kafka_consumer_max_bytes.to_string(),
            )
            .set(
                "fetch.wait.max.ms",
                config.kafka_consumer_max_wait_ms.to_string(),
            )
            .set(
                "heartbeat.interval.ms",
                config.kafka_consumer_heartbeat_interval_ms.to_string(),
            )
            .set(
                "session.timeout.ms",
                config.kafka_consumer_session_timeout_ms.to_string(),
            )
            .set(
                "max.poll.interval.ms",
                config.kafka_consumer_rebalance_timeout_ms.to_string(),
            );

        if config.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        };

        debug!("rdkafka consumer configuration: {:?}", client_config);
        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[config.kafka_consumer_topic.as_str()])?;
        info!(
            topic = %config.kafka_consumer_topic,
            group = %config.kafka_consumer_group,
            "subscribed kafka consumer"
        );

        Ok(Self {
            consumer,
            topic: config.kafka_consumer_topic.clone(),
        })
    }
}

#[async_trait]
impl MessageReader for KafkaReader {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<ConsumedMessage, TransportError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Canceled),
            received = self.consumer.recv() => {
                let message = received?;
                Ok(ConsumedMessage {
                    topic: message.topic().to_owned(),
                    partition: message.partition(),
                    offset: message.offset(),
                    key: message.key().map(Bytes::copy_from_slice),
                    payload: message.payload().map(Bytes::copy_from_slice),
                })
            }
        }
    }

    async fn commit(&self, message: &ConsumedMessage) -> Result<(), TransportError> {
        // The committed offset is the next one to read
        let mut list = TopicPartitionList::new();
        list.add_partition_offset(
            &message.topic,
            message.partition,
            Offset::Offset(message.offset + 1),
        )?;
        self.consumer.commit(&list, CommitMode::Sync)?;
        Ok(())
    }

    fn close(&self) {
        self.consumer.unsubscribe();
        info!(topic = %self.topic, "closed kafka consumer");
    }
}
