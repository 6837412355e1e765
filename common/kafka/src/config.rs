use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct ProducerConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "all")]
    pub kafka_producer_acks: String, // 0, 1, all

    #[envconfig(default = "10")]
    pub kafka_producer_max_attempts: u32, // Total delivery attempts, including the first one

    #[envconfig(default = "100")]
    pub kafka_producer_batch_size: u32, // Maximum number of messages per batch

    #[envconfig(default = "10")]
    pub kafka_producer_linger_ms: u32, // Maximum time between producer batches during low traffic

    #[envconfig(default = "20000")]
    pub kafka_message_timeout_ms: u32, // Time before we stop retrying producing a message: 20 seconds

    #[envconfig(default = "none")]
    pub kafka_compression_codec: String, // none, gzip, snappy, lz4, zstd

    // When set, writes return once the message is queued in librdkafka and
    // delivery reports are only logged.
    #[envconfig(default = "false")]
    pub kafka_producer_async: bool,

    // Empty disables the dead-letter fallback
    #[envconfig(default = "")]
    pub kafka_dlq_topic: String,

    #[envconfig(default = "30000")]
    pub kafka_dlq_write_timeout_ms: u64,
}

impl ProducerConfig {
    pub fn dlq_topic(&self) -> Option<&str> {
        let topic = self.kafka_dlq_topic.trim();
        if topic.is_empty() {
            None
        } else {
            Some(topic)
        }
    }

    /// librdkafka counts retries, not attempts: 10 attempts means 9 retries.
    pub fn max_retries(&self) -> u32 {
        self.kafka_producer_max_attempts.saturating_sub(1)
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct ConsumerConfig {
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    #[envconfig(default = "catalog-events")]
    pub kafka_consumer_group: String,

    #[envconfig(default = "user-registration")]
    pub kafka_consumer_topic: String,

    // We default to "earliest" for this, but if you're bringing up a new service, you probably want "latest"
    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String, // earliest, latest

    #[envconfig(default = "10000")]
    pub kafka_consumer_min_bytes: u32, // 10KB

    #[envconfig(default = "10000000")]
    pub kafka_consumer_max_bytes: u32, // 10MB

    #[envconfig(default = "1000")]
    pub kafka_consumer_max_wait_ms: u32,

    #[envconfig(default = "3000")]
    pub kafka_consumer_heartbeat_interval_ms: u32,

    #[envconfig(default = "30000")]
    pub kafka_consumer_session_timeout_ms: u32,

    #[envconfig(default = "60000")]
    pub kafka_consumer_rebalance_timeout_ms: u32,
}

impl ConsumerConfig {
    /// Shared broker and tuning settings, bound to one (group, topic) pair.
    pub fn for_topic(&self, group: &str, topic: &str) -> Self {
        Self {
            kafka_consumer_group: group.to_owned(),
            kafka_consumer_topic: topic.to_owned(),
            ..self.clone()
        }
    }
}
