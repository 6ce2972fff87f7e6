use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::ProductCatalog;
use crate::error::{FetchError, WorkflowError};
use crate::metric_consts::{EVENTS_SKIPPED, RECORDS_WRITTEN};
use crate::payments::PaymentsApi;
use crate::store::ReconciliationStore;
use crate::transformer;
use crate::types::{refund_status, PaymentDetails, PaymentProcessed, PaymentSession};

/// Payments with this product code belong to secure applications; their
/// company number and creator email are blanked before any record is built.
const SECURE_APPLICATION_PRODUCT_CODE: i32 = 16800;

/// Escape hatch for payment resources deleted upstream: when enabled, a 410
/// from the payments service drops the event instead of erroring, optionally
/// scoped to one resource id.
#[derive(Debug, Clone, Default)]
pub struct SkipGonePolicy {
    pub enabled: bool,
    pub resource_id: Option<String>,
}

impl SkipGonePolicy {
    pub fn applies(&self, payment_id: &str) -> bool {
        self.enabled
            && self
                .resource_id
                .as_deref()
                .is_none_or(|id| id.is_empty() || id == payment_id)
    }
}

/// Orchestrates one end-to-end event: fetch the payment session, classify,
/// branch between payment and refund handling, transform and persist.
///
/// `process` returns every error the event surfaced. Fatal errors short
/// circuit, except during persistence where each record failure is isolated
/// so one bad insert neither aborts the rest of the batch nor goes
/// unreported. The caller routes each returned error through its error
/// handler; an empty list means the offset may advance with nothing else
/// owed for this event.
pub struct ReconciliationWorkflow {
    payments: Arc<dyn PaymentsApi>,
    store: Arc<dyn ReconciliationStore>,
    catalog: Arc<ProductCatalog>,
    skip_gone: SkipGonePolicy,
}

impl ReconciliationWorkflow {
    pub fn new(
        payments: Arc<dyn PaymentsApi>,
        store: Arc<dyn ReconciliationStore>,
        catalog: Arc<ProductCatalog>,
        skip_gone: SkipGonePolicy,
    ) -> Self {
        Self {
            payments,
            store,
            catalog,
            skip_gone,
        }
    }

    pub async fn process(&self, event: &PaymentProcessed) -> Vec<WorkflowError> {
        let payment_id = event.payment_resource_id.as_str();

        let mut payment = match self.payments.fetch_payment(payment_id).await {
            Ok((payment, status)) => {
                debug!(payment_id, status, "fetched payment session");
                payment
            }
            Err(FetchError::ResourceGone) if self.skip_gone.applies(payment_id) => {
                info!(payment_id, "payment resource is gone, dropping event");
                metrics::counter!(EVENTS_SKIPPED, "cause" => "resource_gone").increment(1);
                return Vec::new();
            }
            Err(e) => return vec![e.into()],
        };

        if !payment.is_reconcilable(&self.catalog) {
            info!(payment_id, "payment is not reconcilable, skipping");
            metrics::counter!(EVENTS_SKIPPED, "cause" => "not_reconcilable").increment(1);
            return Vec::new();
        }

        let details = match self.payments.fetch_payment_details(payment_id).await {
            Ok((details, status)) => {
                debug!(payment_id, status, "fetched payment details");
                details
            }
            Err(e) => return vec![e.into()],
        };

        if event.is_refund() {
            self.reconcile_refund(event, &mut payment)
                .await
                .err()
                .into_iter()
                .collect()
        } else if details.payment_status == "accepted" {
            self.reconcile_payment(&mut payment, &details, payment_id)
                .await
        } else {
            info!(
                payment_id,
                payment_status = %details.payment_status,
                "payment was not accepted, skipping"
            );
            metrics::counter!(EVENTS_SKIPPED, "cause" => "not_accepted").increment(1);
            Vec::new()
        }
    }

    /// Handle a refund notification. A refund still reported as submitted is
    /// refreshed against the upstream once; if it remains non-terminal the
    /// event is surfaced as retryable so the retry tier re-polls after its
    /// throttle interval.
    async fn reconcile_refund(
        &self,
        event: &PaymentProcessed,
        payment: &mut PaymentSession,
    ) -> Result<(), WorkflowError> {
        let payment_id = event.payment_resource_id.as_str();
        let refund_id = event.refund_id.as_deref().unwrap_or_default();

        let refund = payment
            .refund(refund_id)
            .cloned()
            .ok_or(WorkflowError::RefundNotFound)?;

        let refund = if refund.status == refund_status::SUBMITTED {
            let (latest, status) = self
                .payments
                .refresh_refund_status(payment_id, refund_id)
                .await?;
            debug!(payment_id, refund_id, status, "refreshed refund status");
            latest
        } else {
            refund
        };

        match refund.status.as_str() {
            refund_status::SUCCESS => {
                self.mask_sensitive_fields(payment);
                let entry =
                    transformer::build_refund(payment, &refund, payment_id, &self.catalog)?;
                self.store
                    .append_refund(&entry)
                    .await
                    .map_err(WorkflowError::Persistence)?;
                metrics::counter!(RECORDS_WRITTEN, "kind" => "refund").increment(1);
                info!(payment_id, refund_id, "refund reconciled");
                Ok(())
            }
            refund_status::FAILED => {
                info!(payment_id, refund_id, "refund failed upstream, skipping");
                metrics::counter!(EVENTS_SKIPPED, "cause" => "refund_failed").increment(1);
                Ok(())
            }
            _ => Err(WorkflowError::RefundStillSubmitted),
        }
    }

    /// Persist the product and transaction projections of an accepted
    /// payment. Each append is isolated: a failed insert is surfaced but the
    /// remaining entries are still attempted.
    async fn reconcile_payment(
        &self,
        payment: &mut PaymentSession,
        details: &PaymentDetails,
        payment_id: &str,
    ) -> Vec<WorkflowError> {
        self.mask_sensitive_fields(payment);

        let mut errors = Vec::new();

        let products =
            match transformer::build_products(payment, details, payment_id, &self.catalog) {
                Ok(products) => products,
                Err(e) => return vec![e.into()],
            };
        for entry in &products {
            match self.store.append_product(entry).await {
                Ok(()) => {
                    metrics::counter!(RECORDS_WRITTEN, "kind" => "product").increment(1);
                }
                Err(e) => {
                    warn!(payment_id, "failed to persist product entry: {e}");
                    errors.push(WorkflowError::Persistence(e));
                }
            }
        }

        let transactions = match transformer::build_transactions(payment, details, payment_id) {
            Ok(transactions) => transactions,
            Err(e) => {
                errors.push(e.into());
                return errors;
            }
        };
        for entry in &transactions {
            match self.store.append_transaction(entry).await {
                Ok(()) => {
                    metrics::counter!(RECORDS_WRITTEN, "kind" => "transaction").increment(1);
                }
                Err(e) => {
                    warn!(payment_id, "failed to persist transaction entry: {e}");
                    errors.push(WorkflowError::Persistence(e));
                }
            }
        }

        if errors.is_empty() {
            info!(
                payment_id,
                products = products.len(),
                transactions = transactions.len(),
                "payment reconciled"
            );
        }
        errors
    }

    /// Blank the fields a secure application must not leak. The mutation is
    /// in-memory only, ahead of the transformer; nothing is written back to
    /// the payments service.
    fn mask_sensitive_fields(&self, payment: &mut PaymentSession) {
        const MASKED_VALUE: &str = "";

        let product_code = payment
            .costs
            .first()
            .map(|cost| self.catalog.code(&cost.product_type))
            .unwrap_or(0);

        if product_code == SECURE_APPLICATION_PRODUCT_CODE {
            debug!("blanking sensitive fields for a secure application");
            payment.company_number = MASKED_VALUE.to_string();
            payment.created_by.email = MASKED_VALUE.to_string();
        }
    }
}
