use std::sync::Arc;

use rdkafka::producer::FutureProducer;
use tracing::info;

use crate::catalog::ProductCatalog;
use crate::config::Config;
use crate::error::UnhandledError;
use crate::health::{PipelineHealth, BEAT_DEADLINE};
use crate::payments::PaymentsClient;
use crate::pipeline::republish;
use crate::schema::{self, EventCodec};
use crate::store::PgStore;

/// Process-wide collaborators, wired once at startup and shared by the
/// pipelines. Every failure here is fatal: the service cannot reconcile
/// without its schema, catalog, broker, store and upstream client.
pub struct AppContext {
    pub config: Config,
    pub health: Arc<PipelineHealth>,
    pub producer: FutureProducer,
    pub codec: Arc<EventCodec>,
    pub catalog: Arc<ProductCatalog>,
    pub store: Arc<PgStore>,
    pub payments: Arc<PaymentsClient>,
}

impl AppContext {
    pub async fn new(config: &Config) -> Result<Self, UnhandledError> {
        let health = PipelineHealth::new(BEAT_DEADLINE);

        let definition =
            schema::fetch_schema(&config.schema_registry_url, schema::SCHEMA_NAME).await?;
        info!(schema_name = schema::SCHEMA_NAME, "received event schema");
        let codec = Arc::new(EventCodec::new(&definition)?);

        let catalog = Arc::new(ProductCatalog::load(&config.product_code_path)?);
        info!(products = catalog.len(), "product catalog loaded");

        let producer = republish::create_producer(&config.kafka)?;
        let store = Arc::new(PgStore::connect(config).await?);
        let payments = Arc::new(PaymentsClient::new(
            &config.payments_api_url,
            &config.payments_api_key,
        )?);

        Ok(Self {
            config: config.clone(),
            health,
            producer,
            codec,
            catalog,
            store,
            payments,
        })
    }
}
