use chrono::{DateTime, Utc};
use serde::Serialize;

/// One product line persisted per cost of a reconcilable payment.
/// `filing_date` and `made_up_date` are populated by a later enrichment
/// step downstream and are stored empty here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductEntry {
    pub payment_ref: String,
    pub product_code: i32,
    pub company_number: String,
    pub filing_date: String,
    pub made_up_date: String,
    pub transaction_date: DateTime<Utc>,
}

/// One transaction line persisted per cost of a reconcilable payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionEntry {
    pub transaction_id: String,
    pub transaction_date: DateTime<Utc>,
    pub email: String,
    pub payment_method: String,
    pub amount: String,
    pub company_number: String,
    pub transaction_type: String,
    pub order_reference: String,
    pub status: String,
    pub user_id: String,
    pub original_reference: String,
    pub dispute_details: String,
}

/// The single record persisted for a successfully refunded payment.
/// `amount` is major currency units rendered as a decimal string;
/// `original_reference` links back to the refunded payment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefundEntry {
    pub transaction_id: String,
    pub transaction_date: DateTime<Utc>,
    pub refund_id: String,
    pub refunded_at: String,
    pub payment_id: String,
    pub email: String,
    pub payment_method: String,
    pub amount: String,
    pub company_number: String,
    pub transaction_type: String,
    pub order_reference: String,
    pub status: String,
    pub user_id: String,
    pub original_reference: String,
    pub dispute_details: String,
    pub product_code: i32,
}
