use std::sync::Arc;
use std::time::Duration;

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::config::Config;
use crate::error::UnhandledError;
use crate::health::PipelineBeat;
use crate::metric_consts::{
    EVENTS_RECEIVED, EVENT_DECODE_FAILURES, OFFSET_COMMIT_FAILURES, WORKFLOW_ERRORS,
};
use crate::schema::EventCodec;
use crate::workflow::ReconciliationWorkflow;

pub mod republish;

use self::republish::{Republisher, RetryPolicy, Tier};

const WATERMARK_TIMEOUT: Duration = Duration::from_secs(10);

/// Lifecycle of a pipeline. `Draining` is entered on the close signal or on
/// reaching the bounded drain offset; `Closed` once the broker resources are
/// released. A pipeline that drained without a close signal parks in
/// `Draining` until the supervisor fans the signal out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Draining,
    Closed,
}

/// A single-tier resilient consumer. Each instance owns one consumer bound
/// to exactly one topic tier, processes messages strictly in delivery order
/// and commits an offset only after the attempt on that message finished,
/// so a crash replays at most one in-flight event.
pub struct ResilientPipeline {
    consumer: StreamConsumer,
    topic: String,
    tier: Tier,
    codec: Arc<EventCodec>,
    workflow: ReconciliationWorkflow,
    republisher: Republisher,
    throttle: Option<Duration>,
    shutdown: mpsc::Receiver<()>,
    state: watch::Sender<PipelineState>,
    liveness: PipelineBeat,
}

impl ResilientPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &Config,
        tier: Tier,
        codec: Arc<EventCodec>,
        workflow: ReconciliationWorkflow,
        republisher: Republisher,
        retry: Option<RetryPolicy>,
        shutdown: mpsc::Receiver<()>,
        liveness: PipelineBeat,
    ) -> Result<(Self, watch::Receiver<PipelineState>), UnhandledError> {
        let topic = tier.topic(&config.payment_processed_topic, &config.group_name);

        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", &config.kafka.kafka_hosts)
            .set("group.id", &config.group_name)
            .set("auto.offset.reset", &config.kafka.kafka_consumer_offset_reset)
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false");

        if config.kafka.kafka_tls {
            client_config
                .set("security.protocol", "ssl")
                .set("enable.ssl.certificate.verification", "false");
        }

        let consumer: StreamConsumer = client_config.create()?;
        consumer.subscribe(&[topic.as_str()])?;
        info!(%topic, group = %config.group_name, "joined consumer group");

        // The retry policy is the single source of the throttle: only the
        // pipeline handed one spaces its consumption out
        let throttle = retry.map(|policy| policy.throttle);

        let (state, state_rx) = watch::channel(PipelineState::Idle);

        Ok((
            Self {
                consumer,
                topic,
                tier,
                codec,
                workflow,
                republisher,
                throttle,
                shutdown,
                state,
                liveness,
            },
            state_rx,
        ))
    }

    /// Consume until the close signal arrives or, on the error tier, until
    /// the backlog captured at startup is drained.
    pub async fn run(self) {
        let ResilientPipeline {
            consumer,
            topic,
            tier,
            codec,
            workflow,
            republisher,
            throttle,
            mut shutdown,
            state,
            liveness,
        } = self;

        // The error tier drains the backlog present at startup and nothing
        // more: capture the end offset now and stop once it is reached.
        let mut drained = false;
        let stop_at = if tier == Tier::Error {
            match consumer.fetch_watermarks(&topic, 0, WATERMARK_TIMEOUT) {
                Ok((low, high)) => {
                    info!(%topic, backlog_offset = high, "error consumer will stop when the backlog offset is reached");
                    if high <= low {
                        drained = true;
                    }
                    Some(high)
                }
                Err(e) => {
                    error!(%topic, "failed to fetch the backlog offset: {e}");
                    None
                }
            }
        } else {
            None
        };

        let _ = state.send(PipelineState::Running);
        info!(%topic, "pipeline consuming");

        // The probe deadline outlives broker quiet periods because the
        // heartbeat fires regardless of message arrival
        let mut heartbeat = tokio::time::interval(Duration::from_secs(10));

        let mut last: Option<(i32, i64)> = None;
        let mut shutdown_seen = false;

        while !drained {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(%topic, "close signal received");
                    shutdown_seen = true;
                    break;
                }
                _ = heartbeat.tick() => {
                    liveness.report_healthy();
                }
                received = consumer.recv() => {
                    let message = match received {
                        Ok(message) => message,
                        Err(e) => {
                            error!(%topic, "error receiving message: {e}");
                            continue;
                        }
                    };

                    liveness.report_healthy();
                    metrics::counter!(EVENTS_RECEIVED, "topic" => topic.clone()).increment(1);

                    // Space retries out so the upstream has room to recover
                    if let Some(throttle) = throttle {
                        tokio::time::sleep(throttle).await;
                    }

                    // Commit the previous message before starting on this one
                    if let Some((partition, offset)) = last.take() {
                        commit_offset(&consumer, &topic, partition, offset);
                    }

                    let partition = message.partition();
                    let offset = message.offset();
                    let payload = message.payload().unwrap_or_default();

                    match codec.decode(payload) {
                        Err(e) => {
                            metrics::counter!(EVENT_DECODE_FAILURES, "topic" => topic.clone())
                                .increment(1);
                            error!(%topic, offset, "failed to decode event: {e}");
                            if let Err(e) = republisher.handle_undecodable(payload).await {
                                error!(%topic, offset, "failed to republish undecodable event: {e}");
                            }
                        }
                        Ok(event) => {
                            debug!(
                                %topic,
                                offset,
                                payment_resource_id = %event.payment_resource_id,
                                "attempting reconciliation"
                            );
                            for workflow_error in workflow.process(&event).await {
                                metrics::counter!(WORKFLOW_ERRORS, "topic" => topic.clone())
                                    .increment(1);
                                error!(
                                    %topic,
                                    offset,
                                    payment_resource_id = %event.payment_resource_id,
                                    attempt = event.attempt,
                                    "reconciliation failed: {workflow_error}"
                                );
                                if let Err(e) = republisher.handle(offset, &event).await {
                                    error!(%topic, offset, "failed to republish event: {e}");
                                }
                            }
                        }
                    }

                    last = Some((partition, offset));
                    if stop_at.is_some_and(|stop| offset >= stop - 1) {
                        info!(%topic, offset, "backlog offset reached");
                        drained = true;
                    }
                }
            }
        }

        // The attempt on the final message completed, so its offset may advance
        if let Some((partition, offset)) = last.take() {
            commit_offset(&consumer, &topic, partition, offset);
        }

        let _ = state.send(PipelineState::Draining);

        // Park until the supervisor fans the close signal out, even when the
        // bounded drain finished first: exiting early under an orchestrator
        // restarts the process and sets it chasing its own tail through the
        // error topic.
        if !shutdown_seen {
            info!(%topic, "drained, awaiting close signal");
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = heartbeat.tick() => {
                        liveness.report_healthy();
                    }
                }
            }
        }

        drop(republisher);
        drop(consumer);
        let _ = state.send(PipelineState::Closed);
        info!(%topic, "pipeline shut down");
    }
}

fn commit_offset(consumer: &StreamConsumer, topic: &str, partition: i32, offset: i64) {
    debug!(%topic, offset, "committing message");

    let mut commit_list = TopicPartitionList::new();
    // The committed offset names the next message to be consumed
    if let Err(e) = commit_list.add_partition_offset(topic, partition, Offset::Offset(offset + 1)) {
        error!(%topic, offset, "failed to build the commit list: {e}");
        return;
    }

    if let Err(e) = consumer.commit(&commit_list, CommitMode::Sync) {
        metrics::counter!(OFFSET_COMMIT_FAILURES, "topic" => topic.to_string()).increment(1);
        error!(%topic, offset, "failed to commit offset: {e}");
    }
}
