use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::catalog::ProductCatalog;

pub mod records;

/// The classes of payment this service reconciles. Anything else (penalties,
/// legacy filings) is handled by other finance systems and skipped here.
pub const RECONCILABLE_CLASSES: [&str; 2] = ["data-maintenance", "orderable-item"];

/// The decoded `payment-processed` event. A non-empty `refund_id` marks the
/// event as a refund notification rather than a payment notification.
/// `attempt` counts republishes to the retry tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentProcessed {
    pub payment_resource_id: String,
    #[serde(default)]
    pub refund_id: Option<String>,
    #[serde(default)]
    pub attempt: i32,
}

impl PaymentProcessed {
    pub fn is_refund(&self) -> bool {
        self.refund_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// A payment session as returned by the payments service GET payment
/// endpoint. The service consumes a subset of the upstream payload; unknown
/// fields are ignored on deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentSession {
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub payment_method: String,
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub company_number: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub created_by: CreatedBy,
    #[serde(default)]
    pub costs: Vec<Cost>,
    #[serde(default)]
    pub refunds: Vec<Refund>,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub etag: String,
}

impl PaymentSession {
    /// A payment is reconcilable iff the first cost's first class of payment
    /// is one this service owns AND its product type resolves to a non-zero
    /// code. The zero-code check keeps product types the finance map does
    /// not know about out of the downstream feeds.
    pub fn is_reconcilable(&self, catalog: &ProductCatalog) -> bool {
        let Some(cost) = self.costs.first() else {
            return false;
        };
        let Some(class) = cost.class_of_payment.first() else {
            return false;
        };
        RECONCILABLE_CLASSES.contains(&class.as_str()) && catalog.code(&cost.product_type) != 0
    }

    pub fn cost_for(&self, description_identifier: &str) -> Option<&Cost> {
        self.costs
            .iter()
            .find(|cost| cost.description_identifier == description_identifier)
    }

    pub fn refund(&self, refund_id: &str) -> Option<&Refund> {
        self.refunds
            .iter()
            .find(|refund| refund.refund_id == refund_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cost {
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub available_payment_methods: Vec<String>,
    #[serde(default)]
    pub class_of_payment: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub description_identifier: String,
    #[serde(default)]
    pub product_type: String,
    #[serde(default)]
    pub description_values: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatedBy {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub forename: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub surname: String,
}

/// A payment's card-level details from the private payment-details endpoint.
/// `transaction_date` is RFC 3339 with fractional seconds and is parsed at
/// transformation time so a malformed date surfaces as a workflow error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaymentDetails {
    #[serde(default)]
    pub card_type: String,
    #[serde(default)]
    pub external_payment_id: String,
    #[serde(default)]
    pub transaction_date: String,
    #[serde(default)]
    pub payment_status: String,
}

/// One refund of a payment. The same shape is embedded in the payment
/// session and returned by the refund-status refresh endpoint; `amount` is
/// in minor currency units.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Refund {
    #[serde(default)]
    pub refund_id: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub refunded_at: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub external_refund_url: String,
}

pub mod refund_status {
    pub const SUBMITTED: &str = "submitted";
    pub const SUCCESS: &str = "success";
    pub const FAILED: &str = "failed";
}

#[cfg(test)]
mod test {
    use super::*;

    fn catalog() -> ProductCatalog {
        ProductCatalog::parse(
            r#"
product_code:
  cic-report: 16220
  certificate: 16100
"#,
        )
        .unwrap()
    }

    fn session(class_of_payment: &str, product_type: &str) -> PaymentSession {
        PaymentSession {
            costs: vec![Cost {
                class_of_payment: vec![class_of_payment.to_string()],
                product_type: product_type.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn data_maintenance_payments_are_reconcilable() {
        assert!(session("data-maintenance", "cic-report").is_reconcilable(&catalog()));
    }

    #[test]
    fn orderable_item_payments_are_reconcilable() {
        assert!(session("orderable-item", "certificate").is_reconcilable(&catalog()));
    }

    #[test]
    fn penalty_payments_are_not_reconcilable() {
        assert!(!session("penalty", "cic-report").is_reconcilable(&catalog()));
    }

    #[test]
    fn unmapped_product_types_are_not_reconcilable() {
        assert!(!session("data-maintenance", "extractives").is_reconcilable(&catalog()));
    }

    #[test]
    fn payments_without_costs_are_not_reconcilable() {
        assert!(!PaymentSession::default().is_reconcilable(&catalog()));
    }

    #[test]
    fn refund_id_marks_refund_events() {
        let mut event = PaymentProcessed {
            payment_resource_id: "P1".to_string(),
            refund_id: None,
            attempt: 0,
        };
        assert!(!event.is_refund());

        event.refund_id = Some(String::new());
        assert!(!event.is_refund());

        event.refund_id = Some("R1".to_string());
        assert!(event.is_refund());
    }

    #[test]
    fn refund_lookup_matches_by_id() {
        let payment = PaymentSession {
            refunds: vec![
                Refund {
                    refund_id: "R1".to_string(),
                    ..Default::default()
                },
                Refund {
                    refund_id: "R2".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(payment.refund("R2").unwrap().refund_id, "R2");
        assert!(payment.refund("R3").is_none());
    }
}
