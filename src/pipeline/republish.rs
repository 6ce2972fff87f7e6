use std::sync::Arc;
use std::time::Duration;

use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::ClientConfig;
use tracing::{debug, error, info};

use crate::config::KafkaConfig;
use crate::error::UnhandledError;
use crate::metric_consts::{EVENTS_REPUBLISHED, REPUBLISH_FAILURES};
use crate::schema::EventCodec;
use crate::types::PaymentProcessed;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(20);

/// The three topic tiers a pipeline can be bound to. For a base topic `T`
/// and consumer group `G`, retries flow through `T-G-retry` and dead events
/// land on `T-G-error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Main,
    Retry,
    Error,
}

impl Tier {
    pub fn topic(&self, base: &str, group: &str) -> String {
        match self {
            Tier::Main => base.to_string(),
            Tier::Retry => format!("{base}-{group}-retry"),
            Tier::Error => format!("{base}-{group}-error"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: i32,
    pub throttle: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Retry { attempt: i32 },
    Error,
}

/// Pick where a failed event goes next. Pipelines without a retry policy
/// route straight to the error tier; pipelines with one keep retrying until
/// the event's attempt counter reaches the policy's maximum.
pub fn route(retry: Option<&RetryPolicy>, attempt: i32) -> Destination {
    match retry {
        Some(policy) if attempt < policy.max_attempts => Destination::Retry {
            attempt: attempt + 1,
        },
        _ => Destination::Error,
    }
}

pub fn create_producer(config: &KafkaConfig) -> Result<FutureProducer, KafkaError> {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        );

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    };

    debug!("rdkafka producer configuration: {:?}", client_config);
    let producer: FutureProducer = client_config.create()?;

    // "Ping" the brokers by requesting metadata before consuming anything
    match producer
        .client()
        .fetch_metadata(None, Duration::from_secs(2))
    {
        Ok(metadata) => {
            info!(
                "connected to kafka brokers, {} topics visible",
                metadata.topics().len()
            );
        }
        Err(error) => {
            error!("failed to fetch metadata from kafka brokers: {:?}", error);
            return Err(error);
        }
    }

    Ok(producer)
}

/// The pipeline's error handler: republishes failed events to the tier
/// `route` picks, re-encoding them with the updated attempt counter. The
/// event identity and resource ids are preserved verbatim; only `attempt`
/// changes (incremented towards the retry tier, reset to zero towards the
/// error tier so a later manual drain starts fresh).
pub struct Republisher {
    producer: FutureProducer,
    codec: Arc<EventCodec>,
    retry_topic: String,
    error_topic: String,
    retry: Option<RetryPolicy>,
}

impl Republisher {
    pub fn new(
        producer: FutureProducer,
        codec: Arc<EventCodec>,
        base_topic: &str,
        group: &str,
        retry: Option<RetryPolicy>,
    ) -> Self {
        Self {
            producer,
            codec,
            retry_topic: Tier::Retry.topic(base_topic, group),
            error_topic: Tier::Error.topic(base_topic, group),
            retry,
        }
    }

    pub async fn handle(
        &self,
        offset: i64,
        event: &PaymentProcessed,
    ) -> Result<(), UnhandledError> {
        match route(self.retry.as_ref(), event.attempt) {
            Destination::Retry { attempt } => {
                let republished = PaymentProcessed {
                    attempt,
                    ..event.clone()
                };
                info!(
                    payment_resource_id = %event.payment_resource_id,
                    offset,
                    attempt,
                    topic = %self.retry_topic,
                    "republishing event for retry"
                );
                self.publish(&self.retry_topic, self.codec.encode(&republished)?)
                    .await
            }
            Destination::Error => {
                let republished = PaymentProcessed {
                    attempt: 0,
                    ..event.clone()
                };
                info!(
                    payment_resource_id = %event.payment_resource_id,
                    offset,
                    attempt = event.attempt,
                    topic = %self.error_topic,
                    "routing event to the error tier"
                );
                self.publish(&self.error_topic, self.codec.encode(&republished)?)
                    .await
            }
        }
    }

    /// Payloads that fail schema decoding are forwarded to the error tier
    /// verbatim; there is no attempt counter to update on a payload we
    /// could not read.
    pub async fn handle_undecodable(&self, payload: &[u8]) -> Result<(), UnhandledError> {
        self.publish(&self.error_topic, payload.to_vec()).await
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), UnhandledError> {
        let record = FutureRecord {
            topic,
            payload: Some(&payload),
            partition: None,
            key: None::<&str>,
            timestamp: None,
            headers: None,
        };

        match self.producer.send(record, PUBLISH_TIMEOUT).await {
            Ok(_) => {
                metrics::counter!(EVENTS_REPUBLISHED, "topic" => topic.to_string()).increment(1);
                Ok(())
            }
            Err((error, _)) => {
                metrics::counter!(REPUBLISH_FAILURES, "topic" => topic.to_string()).increment(1);
                Err(error.into())
            }
        }
    }
}
