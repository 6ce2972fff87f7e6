use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{FetchError, UnhandledError};
use crate::types::{PaymentDetails, PaymentSession, Refund};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The payments-service operations the workflow depends on. Each returns the
/// parsed payload and the HTTP status observed.
#[async_trait]
pub trait PaymentsApi: Send + Sync {
    /// GET `/payments/{id}`. A 410 maps to `FetchError::ResourceGone` so the
    /// caller can apply the skip-gone policy.
    async fn fetch_payment(&self, payment_id: &str) -> Result<(PaymentSession, u16), FetchError>;

    /// GET `/private/payments/{id}/payment-details`.
    async fn fetch_payment_details(
        &self,
        payment_id: &str,
    ) -> Result<(PaymentDetails, u16), FetchError>;

    /// PATCH `/payments/{id}/refunds/{refund_id}`. The PATCH is deliberate:
    /// it asks the upstream to re-poll its gateway and hand back the latest
    /// refund status in the same response. Do not generalize this into a
    /// plain GET.
    async fn refresh_refund_status(
        &self,
        payment_id: &str,
        refund_id: &str,
    ) -> Result<(Refund, u16), FetchError>;
}

/// HTTP client for the payments service. Authenticates with basic auth,
/// API key as the username and an empty password.
pub struct PaymentsClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl PaymentsClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, UnhandledError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, url)
            .basic_auth(&self.api_key, Some(""))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<(T, u16), FetchError> {
        let response = builder
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::OK {
            let payload = response
                .json::<T>()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            Ok((payload, status.as_u16()))
        } else {
            Err(FetchError::InvalidResponse(status.as_u16()))
        }
    }
}

#[async_trait]
impl PaymentsApi for PaymentsClient {
    async fn fetch_payment(&self, payment_id: &str) -> Result<(PaymentSession, u16), FetchError> {
        let path = format!("/payments/{payment_id}");
        debug!(payment_id, path, "fetching payment session");
        // Only this endpoint distinguishes 410: a gone payment session feeds
        // the skip-gone policy, while the other operations treat every
        // non-200 alike
        match self.execute(self.request(Method::GET, &path)).await {
            Err(FetchError::InvalidResponse(410)) => Err(FetchError::ResourceGone),
            other => other,
        }
    }

    async fn fetch_payment_details(
        &self,
        payment_id: &str,
    ) -> Result<(PaymentDetails, u16), FetchError> {
        let path = format!("/private/payments/{payment_id}/payment-details");
        debug!(payment_id, path, "fetching payment details");
        self.execute(self.request(Method::GET, &path)).await
    }

    async fn refresh_refund_status(
        &self,
        payment_id: &str,
        refund_id: &str,
    ) -> Result<(Refund, u16), FetchError> {
        let path = format!("/payments/{payment_id}/refunds/{refund_id}");
        debug!(payment_id, refund_id, path, "refreshing refund status");
        self.execute(self.request(Method::PATCH, &path)).await
    }
}
