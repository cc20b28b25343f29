//! Storage ports. Adapters live in `crate::adapters`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{PaymentSession, Record, TraceKey, Transaction};
use crate::error::AppError;

/// Attempts before a hot entity is reported as a conflict.
pub const MAX_CAS_RETRIES: usize = 16;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("version conflict on {0}")]
    VersionConflict(Uuid),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait Repository<T: Record>: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<T>;

    /// Replaces the record only if its stored version equals
    /// `expected_version`; the stored copy gets `expected_version + 1`.
    async fn compare_and_swap(&self, expected_version: i64, next: &T) -> RepositoryResult<T>;
}

#[async_trait]
pub trait TransactionRepository: Repository<Transaction> {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn list_by_merchant_order(
        &self,
        merchant_id: &str,
        merchant_order_id: &str,
    ) -> RepositoryResult<Vec<Transaction>>;

    /// Terminal transactions whose current status the merchant has not acknowledged.
    async fn list_unacknowledged(&self, limit: i64) -> RepositoryResult<Vec<Transaction>>;
}

#[async_trait]
pub trait SessionRepository: Repository<PaymentSession> {
    /// Inserts unless a session with the same trace triple exists; returns the
    /// stored session and whether it was created by this call.
    async fn insert_if_absent(
        &self,
        session: &PaymentSession,
    ) -> RepositoryResult<(PaymentSession, bool)>;

    async fn find_by_trace(&self, trace: &TraceKey) -> RepositoryResult<Option<PaymentSession>>;

    /// Sessions past their TTL while still `Created`, or holding an
    /// unacknowledged notifiable status.
    async fn list_needing_attention(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<PaymentSession>>;
}

/// Read-modify-write of one entity under optimistic concurrency.
///
/// `apply` sees a fresh copy on every attempt. Returning `Err` aborts without
/// writing; an unchanged copy is not written either.
pub async fn mutate<T, R, Repo, F>(
    repo: &Repo,
    id: Uuid,
    now: DateTime<Utc>,
    mut apply: F,
) -> Result<(T, R), AppError>
where
    T: Record,
    R: Send,
    Repo: Repository<T> + ?Sized,
    F: FnMut(&mut T) -> Result<R, AppError> + Send,
{
    for _ in 0..MAX_CAS_RETRIES {
        let current = repo.get_by_id(id).await?;
        let mut next = current.clone();
        let result = apply(&mut next)?;

        if next == current {
            return Ok((current, result));
        }

        next.touch(now);
        match repo.compare_and_swap(current.version(), &next).await {
            Ok(stored) => return Ok((stored, result)),
            Err(RepositoryError::VersionConflict(_)) => {
                tracing::debug!(entity_id = %id, "version conflict, retrying");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(AppError::Conflict(format!(
        "{} is under heavy concurrent modification",
        id
    )))
}
