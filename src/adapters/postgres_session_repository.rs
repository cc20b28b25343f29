//! Postgres implementation of SessionRepository.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{NotificationLedger, PaymentSession, PaymentStatus, TraceKey};
use crate::ports::{Repository, RepositoryError, RepositoryResult, SessionRepository};

const COLUMNS: &str = r#"
    id, switch_transaction_id, merchant_id, stan, switch_timestamp, amount, currency,
    status, attempted, payment_method, expires_at, created_at, updated_at,
    switch_notified_status, switch_notify_attempts, switch_notify_last_error,
    switch_notified_at, switch_notify_claimed_until, version
"#;

#[derive(Clone)]
pub struct PostgresSessionRepository {
    pool: PgPool,
}

impl PostgresSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository<PaymentSession> for PostgresSessionRepository {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<PaymentSession> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM payment_sessions WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("payment session {}", id)))?
            .into_domain()
    }

    async fn compare_and_swap(
        &self,
        expected_version: i64,
        next: &PaymentSession,
    ) -> RepositoryResult<PaymentSession> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            UPDATE payment_sessions SET
                status = $3,
                attempted = $4,
                payment_method = $5,
                switch_notified_status = $6,
                switch_notify_attempts = $7,
                switch_notify_last_error = $8,
                switch_notified_at = $9,
                switch_notify_claimed_until = $10,
                updated_at = $11,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(next.id)
        .bind(expected_version)
        .bind(next.status.as_str())
        .bind(next.attempted)
        .bind(next.payment_method.map(|m| m.as_str()))
        .bind(next.switch_notification.last_notified_status.map(|s| s.as_str()))
        .bind(next.switch_notification.attempts)
        .bind(&next.switch_notification.last_error)
        .bind(next.switch_notification.notified_at)
        .bind(next.switch_notification.claimed_until)
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
impl SessionRepository for PostgresSessionRepository {
    async fn insert_if_absent(
        &self,
        session: &PaymentSession,
    ) -> RepositoryResult<(PaymentSession, bool)> {
        // The unique trace index decides the winner of concurrent inits.
        let inserted = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            INSERT INTO payment_sessions (
                id, switch_transaction_id, merchant_id, stan, switch_timestamp, amount, currency,
                status, attempted, payment_method, expires_at, created_at, updated_at,
                switch_notified_status, switch_notify_attempts, switch_notify_last_error,
                switch_notified_at, version
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            ON CONFLICT (merchant_id, stan, switch_timestamp) DO NOTHING
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(session.id)
        .bind(session.switch_transaction_id)
        .bind(&session.merchant_id)
        .bind(&session.stan)
        .bind(session.switch_timestamp)
        .bind(&session.amount)
        .bind(&session.currency)
        .bind(session.status.as_str())
        .bind(session.attempted)
        .bind(session.payment_method.map(|m| m.as_str()))
        .bind(session.expires_at)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.switch_notification.last_notified_status.map(|s| s.as_str()))
        .bind(session.switch_notification.attempts)
        .bind(&session.switch_notification.last_error)
        .bind(session.switch_notification.notified_at)
        .bind(session.version)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((row.into_domain()?, true));
        }

        let existing = self
            .find_by_trace(&session.trace_key())
            .await?
            .ok_or_else(|| RepositoryError::Duplicate(format!("payment session {}", session.id)))?;
        Ok((existing, false))
    }

    async fn find_by_trace(&self, trace: &TraceKey) -> RepositoryResult<Option<PaymentSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM payment_sessions WHERE merchant_id = $1 AND stan = $2 AND switch_timestamp = $3",
            COLUMNS
        ))
        .bind(&trace.merchant_id)
        .bind(&trace.stan)
        .bind(trace.switch_timestamp)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRow::into_domain).transpose()
    }

    async fn list_needing_attention(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<PaymentSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            r#"
            SELECT {} FROM payment_sessions
            WHERE (status = 'Created' AND expires_at < $1)
               OR (status IN ('Paid', 'Failed', 'Expired')
                   AND switch_notified_status IS DISTINCT FROM status)
            ORDER BY updated_at ASC
            LIMIT $2
            "#,
            COLUMNS
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_domain).collect()
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: Uuid,
    switch_transaction_id: Uuid,
    merchant_id: String,
    stan: String,
    switch_timestamp: DateTime<Utc>,
    amount: BigDecimal,
    currency: String,
    status: String,
    attempted: bool,
    payment_method: Option<String>,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    switch_notified_status: Option<String>,
    switch_notify_attempts: i32,
    switch_notify_last_error: Option<String>,
    switch_notified_at: Option<DateTime<Utc>>,
    switch_notify_claimed_until: Option<DateTime<Utc>>,
    version: i64,
}

impl SessionRow {
    fn into_domain(self) -> RepositoryResult<PaymentSession> {
        let status = self
            .status
            .parse::<PaymentStatus>()
            .map_err(RepositoryError::Corrupt)?;
        let payment_method = self
            .payment_method
            .map(|m| m.parse())
            .transpose()
            .map_err(RepositoryError::Corrupt)?;
        let last_notified_status = self
            .switch_notified_status
            .map(|s| s.parse::<PaymentStatus>())
            .transpose()
            .map_err(RepositoryError::Corrupt)?;

        Ok(PaymentSession {
            id: self.id,
            switch_transaction_id: self.switch_transaction_id,
            merchant_id: self.merchant_id,
            stan: self.stan,
            switch_timestamp: self.switch_timestamp,
            amount: self.amount,
            currency: self.currency,
            status,
            attempted: self.attempted,
            payment_method,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            switch_notification: NotificationLedger {
                last_notified_status,
                attempts: self.switch_notify_attempts,
                last_error: self.switch_notify_last_error,
                notified_at: self.switch_notified_at,
                claimed_until: self.switch_notify_claimed_until,
            },
            version: self.version,
        })
    }
}
