use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::time::timeout;
use tracing::info;

use crate::config::Config;
use crate::error::UnhandledError;
use crate::types::records::{ProductEntry, RefundEntry, TransactionEntry};

const PING_DEADLINE: Duration = Duration::from_secs(5);

/// Append-only persistence for the three reconciliation record kinds. The
/// appends are independent of one another; there is no cross-record
/// transaction, and failures are handed back to the caller unchanged.
#[async_trait]
pub trait ReconciliationStore: Send + Sync {
    async fn append_product(&self, entry: &ProductEntry) -> Result<(), sqlx::Error>;
    async fn append_transaction(&self, entry: &TransactionEntry) -> Result<(), sqlx::Error>;
    async fn append_refund(&self, entry: &RefundEntry) -> Result<(), sqlx::Error>;
}

/// Postgres-backed store. Each record kind has its own table (names come
/// from configuration) and each append inserts exactly one row.
pub struct PgStore {
    pool: PgPool,
    products_table: String,
    transactions_table: String,
    refunds_table: String,
}

impl PgStore {
    /// Connects and pings the database. The caller cannot make progress
    /// without a working store, so a ping that fails or exceeds its deadline
    /// must be treated as fatal.
    pub async fn connect(config: &Config) -> Result<Self, UnhandledError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_pg_connections)
            .connect(&config.database_url)
            .await?;

        timeout(PING_DEADLINE, sqlx::query("SELECT 1").execute(&pool))
            .await
            .map_err(|_| {
                UnhandledError::Other(format!(
                    "store ping did not complete within {}s",
                    PING_DEADLINE.as_secs()
                ))
            })??;

        info!("connected to the reconciliation store");

        Ok(Self {
            pool,
            products_table: config.products_table.clone(),
            transactions_table: config.transactions_table.clone(),
            refunds_table: config.refunds_table.clone(),
        })
    }
}

#[async_trait]
impl ReconciliationStore for PgStore {
    async fn append_product(&self, entry: &ProductEntry) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO {} \
             (payment_ref, product_code, company_number, filing_date, made_up_date, transaction_date) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            self.products_table
        );
        sqlx::query(&query)
            .bind(&entry.payment_ref)
            .bind(entry.product_code)
            .bind(&entry.company_number)
            .bind(&entry.filing_date)
            .bind(&entry.made_up_date)
            .bind(entry.transaction_date)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_transaction(&self, entry: &TransactionEntry) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO {} \
             (transaction_id, transaction_date, email, payment_method, amount, company_number, \
              transaction_type, order_reference, status, user_id, original_reference, dispute_details) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            self.transactions_table
        );
        sqlx::query(&query)
            .bind(&entry.transaction_id)
            .bind(entry.transaction_date)
            .bind(&entry.email)
            .bind(&entry.payment_method)
            .bind(&entry.amount)
            .bind(&entry.company_number)
            .bind(&entry.transaction_type)
            .bind(&entry.order_reference)
            .bind(&entry.status)
            .bind(&entry.user_id)
            .bind(&entry.original_reference)
            .bind(&entry.dispute_details)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append_refund(&self, entry: &RefundEntry) -> Result<(), sqlx::Error> {
        let query = format!(
            "INSERT INTO {} \
             (transaction_id, transaction_date, refund_id, refunded_at, payment_id, email, \
              payment_method, amount, company_number, transaction_type, order_reference, status, \
              user_id, original_reference, dispute_details, product_code) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
            self.refunds_table
        );
        sqlx::query(&query)
            .bind(&entry.transaction_id)
            .bind(entry.transaction_date)
            .bind(&entry.refund_id)
            .bind(&entry.refunded_at)
            .bind(&entry.payment_id)
            .bind(&entry.email)
            .bind(&entry.payment_method)
            .bind(&entry.amount)
            .bind(&entry.company_number)
            .bind(&entry.transaction_type)
            .bind(&entry.order_reference)
            .bind(&entry.status)
            .bind(&entry.user_id)
            .bind(&entry.original_reference)
            .bind(&entry.dispute_details)
            .bind(entry.product_code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
