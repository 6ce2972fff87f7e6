use rdkafka::error::KafkaError;
use thiserror::Error;

/// Process-level failures. Anything surfacing as one of these either aborts
/// startup or is logged by the pipeline and routed through the republisher.
#[derive(Debug, Error)]
pub enum UnhandledError {
    #[error("config error: {0}")]
    Config(#[from] envconfig::Error),
    #[error("kafka error: {0}")]
    Kafka(#[from] KafkaError),
    #[error("store error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("avro error: {0}")]
    Avro(#[from] apache_avro::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("catalog error: {0}")]
    Catalog(#[from] serde_yaml::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Failures talking to the payments service. `status()` reports the HTTP
/// status the caller observed; transport failures carry a synthetic 500.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("the requested payment resource is gone [410]")]
    ResourceGone,
    #[error("invalid status returned from payments api: [{0}]")]
    InvalidResponse(u16),
    #[error("error reaching payments api: {0}")]
    Transport(String),
}

impl FetchError {
    pub fn status(&self) -> u16 {
        match self {
            FetchError::ResourceGone => 410,
            FetchError::InvalidResponse(status) => *status,
            FetchError::Transport(_) => 500,
        }
    }
}

/// Everything the reconciliation workflow can surface for a single event.
/// The pipeline reports each of these through the error handler, which picks
/// retry-tier vs error-tier routing from the event's attempt count.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("refund id not found in payment refunds")]
    RefundNotFound,
    #[error("status is still submitted, retrying")]
    RefundStillSubmitted,
    #[error("invalid transaction date: {0}")]
    InvalidDate(#[from] chrono::ParseError),
    #[error("persistence error: {0}")]
    Persistence(#[source] sqlx::Error),
}
