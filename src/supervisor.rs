use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app_context::AppContext;
use crate::error::UnhandledError;
use crate::pipeline::republish::{Republisher, RetryPolicy, Tier};
use crate::pipeline::{PipelineState, ResilientPipeline};
use crate::workflow::{ReconciliationWorkflow, SkipGonePolicy};

/// Owns the pipelines' lifecycle. Starts one pipeline on the main tier (or
/// on the error tier when deployed as the error queue consumer) plus one on
/// the retry tier, then blocks until a termination signal arrives, fans the
/// signal out over each pipeline's dedicated shutdown channel, and waits for
/// every pipeline to report `Closed`. No pipeline is stopped before the
/// signal, even one whose bounded drain has already completed.
pub async fn run(context: Arc<AppContext>) -> Result<(), UnhandledError> {
    let config = &context.config;

    let mut shutdown_senders: Vec<mpsc::Sender<()>> = Vec::new();
    let mut states: Vec<watch::Receiver<PipelineState>> = Vec::new();
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    let first_tier = if config.is_error_queue_consumer {
        Tier::Error
    } else {
        Tier::Main
    };
    start_pipeline(
        &context,
        first_tier,
        None,
        &mut shutdown_senders,
        &mut states,
        &mut handles,
    )
    .await?;

    if !config.is_error_queue_consumer {
        let retry = RetryPolicy {
            max_attempts: config.max_retry_attempts,
            throttle: Duration::from_secs(config.retry_throttle_rate_seconds),
        };
        start_pipeline(
            &context,
            Tier::Retry,
            Some(retry),
            &mut shutdown_senders,
            &mut states,
            &mut handles,
        )
        .await?;
    }

    wait_for_close_signal().await?;

    info!("close signal received, fanning out");
    for sender in &shutdown_senders {
        if sender.send(()).await.is_err() {
            error!("a pipeline dropped its shutdown channel before the close signal");
        }
    }
    info!("fan out completed");

    for state in &mut states {
        if state
            .wait_for(|s| *s == PipelineState::Closed)
            .await
            .is_err()
        {
            error!("a pipeline exited without reporting closed");
        }
    }
    for handle in handles {
        let _ = handle.await;
    }

    Ok(())
}

async fn start_pipeline(
    context: &Arc<AppContext>,
    tier: Tier,
    retry: Option<RetryPolicy>,
    shutdown_senders: &mut Vec<mpsc::Sender<()>>,
    states: &mut Vec<watch::Receiver<PipelineState>>,
    handles: &mut Vec<JoinHandle<()>>,
) -> Result<(), UnhandledError> {
    let config = &context.config;

    let liveness = context.health.claim(tier);

    let workflow = ReconciliationWorkflow::new(
        context.payments.clone(),
        context.store.clone(),
        context.catalog.clone(),
        SkipGonePolicy {
            enabled: config.skip_gone_resource,
            resource_id: config.skip_gone_resource_id.clone(),
        },
    );

    let republisher = Republisher::new(
        context.producer.clone(),
        context.codec.clone(),
        &config.payment_processed_topic,
        &config.group_name,
        retry,
    );

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let (pipeline, state) = ResilientPipeline::new(
        config,
        tier,
        context.codec.clone(),
        workflow,
        republisher,
        retry,
        shutdown_rx,
        liveness,
    )?;

    shutdown_senders.push(shutdown_tx);
    states.push(state);
    handles.push(tokio::spawn(pipeline.run()));

    Ok(())
}

async fn wait_for_close_signal() -> Result<(), UnhandledError> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
    }

    Ok(())
}
