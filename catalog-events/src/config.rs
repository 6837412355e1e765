use common_kafka::config::{ConsumerConfig, ProducerConfig};
use envconfig::Envconfig;

use crate::pool::PoolConfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "BIND_HOST", default = "::")]
    pub host: String,

    #[envconfig(from = "BIND_PORT", default = "3302")]
    pub port: u16,

    #[envconfig(default = "true")]
    pub export_prometheus: bool,

    #[envconfig(nested = true)]
    pub producer: ProducerConfig,

    #[envconfig(nested = true)]
    pub consumer: ConsumerConfig,

    #[envconfig(from = "POOL_WORKERS", default = "4")]
    pub pool_workers: usize,

    #[envconfig(from = "POOL_BUFFER_SIZE", default = "1000")]
    pub pool_buffer_size: usize,

    // One consumer is started per topic, each in its own group
    #[envconfig(from = "CONSUMER_TOPICS", default = "user-registration")]
    pub consumer_topics: String,

    #[envconfig(from = "KAFKA_CONSUMER_GROUP_PREFIX", default = "catalog-events")]
    pub consumer_group_prefix: String,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn pool(&self) -> PoolConfig {
        PoolConfig {
            workers: self.pool_workers,
            buffer_size: self.pool_buffer_size,
        }
    }

    pub fn topics(&self) -> Vec<&str> {
        self.consumer_topics
            .split(',')
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .collect()
    }

    /// Per-topic consumer settings, grouped as `<prefix>-<topic>`.
    pub fn consumer_configs(&self) -> Vec<ConsumerConfig> {
        self.topics()
            .into_iter()
            .map(|topic| {
                let group = format!("{}-{}", self.consumer_group_prefix, topic);
                self.consumer.for_topic(&group, topic)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_start_one_registration_consumer() {
        let config = Config::init_from_hashmap(&HashMap::new()).expect("defaults should load");

        assert_eq!(config.bind(), ":::3302");
        assert_eq!(config.pool().workers, 4);
        assert_eq!(config.pool().buffer_size, 1000);

        let consumers = config.consumer_configs();
        assert_eq!(consumers.len(), 1);
        assert_eq!(consumers[0].kafka_consumer_topic, "user-registration");
        assert_eq!(
            consumers[0].kafka_consumer_group,
            "catalog-events-user-registration"
        );
    }

    #[test]
    fn topics_are_split_and_trimmed() {
        let env = HashMap::from([
            (
                "CONSUMER_TOPICS".to_string(),
                "user-registration, movie-events,,actor-events ".to_string(),
            ),
            ("KAFKA_CONSUMER_GROUP_PREFIX".to_string(), "audit".to_string()),
        ]);
        let config = Config::init_from_hashmap(&env).expect("config should load");

        assert_eq!(
            config.topics(),
            vec!["user-registration", "movie-events", "actor-events"]
        );
        let groups: Vec<String> = config
            .consumer_configs()
            .into_iter()
            .map(|c| c.kafka_consumer_group)
            .collect();
        assert_eq!(
            groups,
            vec![
                "audit-user-registration",
                "audit-movie-events",
                "audit-actor-events"
            ]
        );
    }
}
