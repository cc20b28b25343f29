//! At-least-once, per-status idempotent delivery of a status change to the
//! next party downstream.
//!
//! Delivery is two-phase: the attempt is persisted before the outbound call
//! and the outcome after it. A failed call leaves the acknowledgment as it was,
//! so whichever access comes next delivers again. The status transition that
//! made the entity notifiable has already been committed by the caller and is
//! never undone here.
//!
//! The attempt also claims the delivery for [`DELIVERY_LEASE_SECS`]. A caller
//! that finds a live claim backs off, so concurrent reads send once. A claim
//! left behind by a crashed process lapses and the next access retries.

use chrono::{DateTime, Duration, Utc};
use std::future::Future;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clients::ClientError;
use crate::domain::Notifiable;
use crate::error::AppError;
use crate::ports::{mutate, Repository};

/// Longer than any outbound timeout.
pub const DELIVERY_LEASE_SECS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome<S> {
    /// The current status was already acknowledged or is not notifiable.
    NothingPending,
    /// Another caller holds the claim on this status.
    InFlight(S),
    Delivered(S),
    Failed { status: S, error: String },
}

impl<S> DeliveryOutcome<S> {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered(_))
    }
}

/// Delivers the entity's pending status through `send`, if one is owed.
///
/// `send` receives the snapshot stored with the attempt recorded. Only
/// repository failures are returned as errors; a failed `send` is recorded on
/// the entity and reported as [`DeliveryOutcome::Failed`].
pub async fn deliver_pending<T, Repo, F, Fut>(
    repo: &Repo,
    id: Uuid,
    now: DateTime<Utc>,
    send: F,
) -> Result<(T, DeliveryOutcome<T::Status>), AppError>
where
    T: Notifiable,
    Repo: Repository<T> + ?Sized,
    F: FnOnce(T) -> Fut + Send,
    Fut: Future<Output = Result<(), ClientError>> + Send,
{
    let lease = Duration::seconds(DELIVERY_LEASE_SECS);
    let (snapshot, claim) = mutate(repo, id, now, |entity: &mut T| {
        let Some(status) = entity.pending_notification() else {
            return Ok(None);
        };
        if entity.ledger().is_claimed(now) {
            return Ok(Some((status, false)));
        }
        entity.ledger_mut().record_attempt(now, lease);
        Ok(Some((status, true)))
    })
    .await?;

    let status = match claim {
        None => return Ok((snapshot, DeliveryOutcome::NothingPending)),
        Some((status, false)) => {
            debug!(entity_id = %id, status = ?status, "delivery already in flight");
            return Ok((snapshot, DeliveryOutcome::InFlight(status)));
        }
        Some((status, true)) => status,
    };

    let attempt = snapshot.ledger().attempts;
    match send(snapshot).await {
        Ok(()) => {
            let (stored, _) = mutate(repo, id, now, |entity: &mut T| {
                entity.ledger_mut().record_success(status, now);
                Ok(())
            })
            .await?;
            info!(entity_id = %id, status = ?status, attempt, "notification delivered");
            Ok((stored, DeliveryOutcome::Delivered(status)))
        }
        Err(e) => {
            let error = e.to_string();
            warn!(entity_id = %id, status = ?status, attempt, error = %error, "notification failed");
            let (stored, _) = mutate(repo, id, now, |entity: &mut T| {
                entity.ledger_mut().record_failure(error.clone());
                Ok(())
            })
            .await?;
            Ok((stored, DeliveryOutcome::Failed { status, error }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryTransactionRepository;
    use crate::domain::transaction::fixtures::new_transaction;
    use crate::domain::{Transaction, TransactionStatus};
    use crate::ports::TransactionRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    async fn paid_transaction(repo: &InMemoryTransactionRepository) -> Transaction {
        let mut tx = Transaction::new(new_transaction(), Utc::now());
        tx.attach_bank_session(Uuid::new_v4()).unwrap();
        tx.transition(TransactionStatus::Paid).unwrap();
        repo.insert(&tx).await.unwrap()
    }

    #[tokio::test]
    async fn test_delivers_once_per_status() {
        let repo = InMemoryTransactionRepository::new();
        let tx = paid_transaction(&repo).await;
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = calls.clone();
            deliver_pending(&repo, tx.id, Utc::now(), |_tx: Transaction| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stored = repo.get_by_id(tx.id).await.unwrap();
        assert_eq!(
            stored.merchant_notification.last_notified_status,
            Some(TransactionStatus::Paid)
        );
        assert_eq!(stored.merchant_notification.attempts, 1);
        assert!(stored.merchant_notification.notified_at.is_some());
    }

    #[tokio::test]
    async fn test_failure_leaves_acknowledgment_unchanged() {
        let repo = InMemoryTransactionRepository::new();
        let tx = paid_transaction(&repo).await;

        let (stored, outcome) = deliver_pending(&repo, tx.id, Utc::now(), |_tx: Transaction| async {
            Err(ClientError::Status(503, "unavailable".to_string()))
        })
        .await
        .unwrap();

        assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));
        assert_eq!(stored.status, TransactionStatus::Paid);
        assert_eq!(stored.merchant_notification.last_notified_status, None);
        assert_eq!(stored.merchant_notification.attempts, 1);
        assert!(stored.merchant_notification.last_error.is_some());

        let (stored, outcome) = deliver_pending(&repo, tx.id, Utc::now(), |_tx: Transaction| async {
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered(TransactionStatus::Paid));
        assert_eq!(stored.merchant_notification.attempts, 2);
        assert_eq!(stored.merchant_notification.last_error, None);
    }

    #[tokio::test]
    async fn test_non_notifiable_status_is_not_sent() {
        let repo = InMemoryTransactionRepository::new();
        let tx = repo
            .insert(&Transaction::new(new_transaction(), Utc::now()))
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let (stored, outcome) = deliver_pending(&repo, tx.id, Utc::now(), |_tx: Transaction| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap();

        assert_eq!(outcome, DeliveryOutcome::NothingPending);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(stored.version, tx.version);
    }

    #[tokio::test]
    async fn test_concurrent_deliveries_send_once() {
        let repo = InMemoryTransactionRepository::new();
        let tx = paid_transaction(&repo).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let now = Utc::now();

        let slow_send = |calls: Arc<AtomicUsize>| {
            move |_tx: Transaction| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(StdDuration::from_millis(50)).await;
                Ok::<(), ClientError>(())
            }
        };

        let (first, second) = tokio::join!(
            deliver_pending(&repo, tx.id, now, slow_send(calls.clone())),
            deliver_pending(&repo, tx.id, now, slow_send(calls.clone())),
        );
        let mut outcomes = vec![first.unwrap().1, second.unwrap().1];
        outcomes.sort_by_key(|o| o.is_delivered());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcomes[0], DeliveryOutcome::InFlight(TransactionStatus::Paid));
        assert_eq!(outcomes[1], DeliveryOutcome::Delivered(TransactionStatus::Paid));

        let stored = repo.get_by_id(tx.id).await.unwrap();
        assert_eq!(stored.merchant_notification.attempts, 1);
        assert!(stored.merchant_notification.claimed_until.is_none());
    }

    #[tokio::test]
    async fn test_lapsed_claim_is_retried() {
        let repo = InMemoryTransactionRepository::new();
        let tx = paid_transaction(&repo).await;
        let now = Utc::now();

        // A claim left by a delivery that never finished.
        let mut claimed = tx.clone();
        claimed
            .merchant_notification
            .record_attempt(now, Duration::seconds(DELIVERY_LEASE_SECS));
        repo.compare_and_swap(tx.version, &claimed).await.unwrap();

        let (_, outcome) = deliver_pending(&repo, tx.id, now, |_tx: Transaction| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::InFlight(TransactionStatus::Paid));

        let later = now + Duration::seconds(DELIVERY_LEASE_SECS);
        let (stored, outcome) = deliver_pending(&repo, tx.id, later, |_tx: Transaction| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(outcome, DeliveryOutcome::Delivered(TransactionStatus::Paid));
        assert_eq!(stored.merchant_notification.attempts, 2);
    }
}
