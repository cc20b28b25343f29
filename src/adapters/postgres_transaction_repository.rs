//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{CallbackUrls, NotificationLedger, Transaction, TransactionStatus};
use crate::ports::{
    Repository, RepositoryError, RepositoryResult, TransactionRepository,
};

const COLUMNS: &str = r#"
    id, merchant_id, merchant_order_id, merchant_timestamp, amount, currency,
    stan, switch_timestamp, status, payment_method, bank_payment_id,
    success_url, fail_url, error_url,
    merchant_notified_status, merchant_notify_attempts, merchant_notify_last_error,
    merchant_notified_at, merchant_notify_claimed_until, created_at, updated_at, version
"#;

/// Postgres-backed transaction repository.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<Transaction> for PostgresTransactionRepository {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?
            .into_domain()
    }

    async fn compare_and_swap(
        &self,
        expected_version: i64,
        next: &Transaction,
    ) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE transactions SET
                stan = $3,
                switch_timestamp = $4,
                status = $5,
                payment_method = $6,
                bank_payment_id = $7,
                merchant_notified_status = $8,
                merchant_notify_attempts = $9,
                merchant_notify_last_error = $10,
                merchant_notified_at = $11,
                merchant_notify_claimed_until = $12,
                updated_at = $13,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(next.id)
        .bind(expected_version)
        .bind(&next.stan)
        .bind(next.switch_timestamp)
        .bind(next.status.as_str())
        .bind(next.payment_method.map(|m| m.as_str()))
        .bind(next.bank_payment_id)
        .bind(next.merchant_notification.last_notified_status.map(|s| s.as_str()))
        .bind(next.merchant_notification.attempts)
        .bind(&next.merchant_notification.last_error)
        .bind(next.merchant_notification.notified_at)
        .bind(next.merchant_notification.claimed_until)
        .bind(next.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.into_domain(),
            None => Err(RepositoryError::VersionConflict(next.id)),
        }
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                id, merchant_id, merchant_order_id, merchant_timestamp, amount, currency,
                stan, switch_timestamp, status, payment_method, bank_payment_id,
                success_url, fail_url, error_url,
                merchant_notified_status, merchant_notify_attempts, merchant_notify_last_error,
                merchant_notified_at, created_at, updated_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                      $15, $16, $17, $18, $19, $20, $21)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(tx.id)
        .bind(&tx.merchant_id)
        .bind(&tx.merchant_order_id)
        .bind(tx.merchant_timestamp)
        .bind(&tx.amount)
        .bind(&tx.currency)
        .bind(&tx.stan)
        .bind(tx.switch_timestamp)
        .bind(tx.status.as_str())
        .bind(tx.payment_method.map(|m| m.as_str()))
        .bind(tx.bank_payment_id)
        .bind(&tx.callbacks.success_url)
        .bind(&tx.callbacks.fail_url)
        .bind(&tx.callbacks.error_url)
        .bind(tx.merchant_notification.last_notified_status.map(|s| s.as_str()))
        .bind(tx.merchant_notification.attempts)
        .bind(&tx.merchant_notification.last_error)
        .bind(tx.merchant_notification.notified_at)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .bind(tx.version)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn list_by_merchant_order(
        &self,
        merchant_id: &str,
        merchant_order_id: &str,
    ) -> RepositoryResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE merchant_id = $1 AND merchant_order_id = $2 ORDER BY created_at ASC",
            COLUMNS
        ))
        .bind(merchant_id)
        .bind(merchant_order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn list_unacknowledged(&self, limit: i64) -> RepositoryResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE status IN ('Paid', 'Failed', 'Error')
              AND merchant_notified_status IS DISTINCT FROM status
            ORDER BY updated_at ASC
            LIMIT $1
            "#,
            COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    merchant_id: String,
    merchant_order_id: String,
    merchant_timestamp: DateTime<Utc>,
    amount: BigDecimal,
    currency: String,
    stan: Option<String>,
    switch_timestamp: Option<DateTime<Utc>>,
    status: String,
    payment_method: Option<String>,
    bank_payment_id: Option<Uuid>,
    success_url: String,
    fail_url: String,
    error_url: String,
    merchant_notified_status: Option<String>,
    merchant_notify_attempts: i32,
    merchant_notify_last_error: Option<String>,
    merchant_notified_at: Option<DateTime<Utc>>,
    merchant_notify_claimed_until: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let status = self
            .status
            .parse::<TransactionStatus>()
            .map_err(RepositoryError::Corrupt)?;
        let payment_method = self
            .payment_method
            .map(|m| m.parse())
            .transpose()
            .map_err(RepositoryError::Corrupt)?;
        let last_notified_status = self
            .merchant_notified_status
            .map(|s| s.parse::<TransactionStatus>())
            .transpose()
            .map_err(RepositoryError::Corrupt)?;

        Ok(Transaction {
            id: self.id,
            merchant_id: self.merchant_id,
            merchant_order_id: self.merchant_order_id,
            merchant_timestamp: self.merchant_timestamp,
            amount: self.amount,
            currency: self.currency,
            stan: self.stan,
            switch_timestamp: self.switch_timestamp,
            status,
            payment_method,
            bank_payment_id: self.bank_payment_id,
            callbacks: CallbackUrls {
                success_url: self.success_url,
                fail_url: self.fail_url,
                error_url: self.error_url,
            },
            merchant_notification: NotificationLedger {
                last_notified_status,
                attempts: self.merchant_notify_attempts,
                last_error: self.merchant_notify_last_error,
                notified_at: self.merchant_notified_at,
                claimed_until: self.merchant_notify_claimed_until,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
            version: self.version,
        })
    }
}
