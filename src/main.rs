use std::sync::Arc;

use envconfig::Envconfig;
use payment_reconciler::app_context::AppContext;
use payment_reconciler::config::Config;
use payment_reconciler::error::UnhandledError;
use payment_reconciler::{server, supervisor};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

fn setup_tracing() {
    let log_layer: tracing_subscriber::filter::Filtered<
        tracing_subscriber::fmt::Layer<tracing_subscriber::Registry>,
        EnvFilter,
        tracing_subscriber::Registry,
    > = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());
    tracing_subscriber::registry().with(log_layer).init();
}

#[tokio::main]
async fn main() -> Result<(), UnhandledError> {
    setup_tracing();
    info!("initialising payment reconciliation consumer...");

    let config = Config::init_from_env()?;
    let context = Arc::new(AppContext::new(&config).await?);

    server::start_server(&config, context.clone());

    supervisor::run(context).await?;

    info!("application successfully shut down");
    Ok(())
}
