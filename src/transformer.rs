use chrono::{DateTime, ParseError, Utc};

use crate::catalog::ProductCatalog;
use crate::types::records::{ProductEntry, RefundEntry, TransactionEntry};
use crate::types::{PaymentDetails, PaymentSession, Refund};

const TRANSACTION_TYPE_BILL: &str = "Immediate bill";
const TRANSACTION_TYPE_REFUND: &str = "Refund";
const SYSTEM_USER: &str = "system";

/// Project a payment into one product entry per cost. The transaction date
/// comes from the payment details and must parse as RFC 3339; a malformed
/// date fails the whole projection so no partial batch is produced.
pub fn build_products(
    payment: &PaymentSession,
    details: &PaymentDetails,
    payment_id: &str,
    catalog: &ProductCatalog,
) -> Result<Vec<ProductEntry>, ParseError> {
    let transaction_date = parse_transaction_date(&details.transaction_date)?;

    Ok(payment
        .costs
        .iter()
        .map(|cost| ProductEntry {
            payment_ref: format!("X{payment_id}"),
            product_code: catalog.code(&cost.product_type),
            company_number: payment.company_number.clone(),
            filing_date: String::new(),
            made_up_date: String::new(),
            transaction_date,
        })
        .collect())
}

/// Project a payment into one transaction entry per cost. The amount is the
/// cost's own amount, not the payment's aggregate.
pub fn build_transactions(
    payment: &PaymentSession,
    details: &PaymentDetails,
    payment_id: &str,
) -> Result<Vec<TransactionEntry>, ParseError> {
    let transaction_date = parse_transaction_date(&details.transaction_date)?;

    Ok(payment
        .costs
        .iter()
        .map(|cost| TransactionEntry {
            transaction_id: format!("X{payment_id}"),
            transaction_date,
            email: payment.created_by.email.clone(),
            payment_method: payment.payment_method.clone(),
            amount: cost.amount.clone(),
            company_number: payment.company_number.clone(),
            transaction_type: TRANSACTION_TYPE_BILL.to_string(),
            order_reference: order_reference(&payment.reference),
            status: details.payment_status.clone(),
            user_id: SYSTEM_USER.to_string(),
            original_reference: String::new(),
            dispute_details: String::new(),
        })
        .collect())
}

/// Project a refund into its single refund entry. The refund amount arrives
/// in minor units and is stored as major units, truncated. The product code
/// is taken from the payment's first cost.
pub fn build_refund(
    payment: &PaymentSession,
    refund: &Refund,
    payment_id: &str,
    catalog: &ProductCatalog,
) -> Result<RefundEntry, ParseError> {
    let transaction_date = parse_transaction_date(&refund.created_at)?;

    let product_code = payment
        .costs
        .first()
        .map(|cost| catalog.code(&cost.product_type))
        .unwrap_or(0);

    Ok(RefundEntry {
        transaction_id: format!("X{}", refund.refund_id),
        transaction_date,
        refund_id: refund.refund_id.clone(),
        refunded_at: refund.refunded_at.clone(),
        payment_id: payment_id.to_string(),
        email: payment.created_by.email.clone(),
        payment_method: payment.payment_method.clone(),
        amount: (refund.amount / 100).to_string(),
        company_number: payment.company_number.clone(),
        transaction_type: TRANSACTION_TYPE_REFUND.to_string(),
        order_reference: order_reference(&payment.reference),
        status: refund.status.clone(),
        user_id: SYSTEM_USER.to_string(),
        original_reference: format!("X{payment_id}"),
        dispute_details: String::new(),
        product_code,
    })
}

/// Downstream order references use hyphens where payment references use
/// underscores. No other rewriting happens.
pub fn order_reference(reference: &str) -> String {
    reference.replace('_', "-")
}

fn parse_transaction_date(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
