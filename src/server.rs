use std::future::ready;
use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::task::JoinHandle;
use tracing::info;

use crate::app_context::AppContext;
use crate::config::Config;

pub async fn index() -> &'static str {
    "payment reconciliation consumer"
}

/// Serve the liveness/readiness probes and the Prometheus scrape endpoint
/// on the configured bind address. Runs for the life of the process.
pub fn start_server(config: &Config, context: Arc<AppContext>) -> JoinHandle<()> {
    let bind = format!("{}:{}", config.host, config.port);
    let recorder_handle = setup_metrics_recorder();

    let router = Router::new()
        .route("/", get(index))
        .route("/_readiness", get(index))
        .route(
            "/_liveness",
            get(move || ready(context.health.status())),
        )
        .route(
            "/metrics",
            get(move || ready(recorder_handle.render())),
        );

    tokio::task::spawn(async move {
        info!("health server listening on {}", bind);
        serve(router, &bind)
            .await
            .expect("failed to start serving health and metrics");
    })
}

async fn serve(router: Router, bind: &str) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

fn setup_metrics_recorder() -> PrometheusHandle {
    const BUCKETS: &[f64] = &[
        0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 50.0,
    ];

    PrometheusBuilder::new()
        .set_buckets(BUCKETS)
        .unwrap()
        .install_recorder()
        .unwrap()
}
