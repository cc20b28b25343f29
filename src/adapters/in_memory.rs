//! In-memory repositories with per-entity locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::{Notifiable, PaymentSession, PaymentStatus, Record, TraceKey, Transaction};
use crate::ports::{
    Repository, RepositoryError, RepositoryResult, SessionRepository, TransactionRepository,
};

/// A thread-safe map of records, one mutex per record.
///
/// The outer `RwLock` is write-locked only to add a record; compare-and-swap
/// takes the outer lock for reading and then only the target record's mutex,
/// so different records are mutated in parallel.
pub struct InMemoryStore<T> {
    rows: RwLock<HashMap<Uuid, Arc<Mutex<T>>>>,
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<T: Record> InMemoryStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: &T) -> RepositoryResult<T> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&record.id()) {
            return Err(RepositoryError::Duplicate(record.id().to_string()));
        }
        rows.insert(record.id(), Arc::new(Mutex::new(record.clone())));
        Ok(record.clone())
    }

    async fn row(&self, id: Uuid) -> Option<Arc<Mutex<T>>> {
        self.rows.read().await.get(&id).cloned()
    }

    pub async fn get(&self, id: Uuid) -> Option<T> {
        let row = self.row(id).await?;
        let record = row.lock().await;
        Some(record.clone())
    }

    pub async fn compare_and_swap(&self, expected_version: i64, next: &T) -> RepositoryResult<T> {
        let row = self
            .row(next.id())
            .await
            .ok_or_else(|| RepositoryError::NotFound(next.id().to_string()))?;

        let mut current = row.lock().await;
        if current.version() != expected_version {
            return Err(RepositoryError::VersionConflict(next.id()));
        }

        let mut stored = next.clone();
        stored.set_version(expected_version + 1);
        *current = stored.clone();
        Ok(stored)
    }

    pub async fn scan<F>(&self, limit: usize, mut predicate: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let rows: Vec<Arc<Mutex<T>>> = self.rows.read().await.values().cloned().collect();
        let mut found = Vec::new();
        for row in rows {
            if found.len() >= limit {
                break;
            }
            let record = row.lock().await;
            if predicate(&record) {
                found.push(record.clone());
            }
        }
        found
    }
}

#[async_trait]
impl<T: Record> Repository<T> for InMemoryStore<T> {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<T> {
        self.get(id)
            .await
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    async fn compare_and_swap(&self, expected_version: i64, next: &T) -> RepositoryResult<T> {
        InMemoryStore::compare_and_swap(self, expected_version, next).await
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTransactionRepository {
    store: Arc<InMemoryStore<Transaction>>,
    by_merchant_order: Arc<RwLock<HashMap<(String, String), Vec<Uuid>>>>,
}

impl InMemoryTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository<Transaction> for InMemoryTransactionRepository {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
    }

    async fn compare_and_swap(
        &self,
        expected_version: i64,
        next: &Transaction,
    ) -> RepositoryResult<Transaction> {
        self.store.compare_and_swap(expected_version, next).await
    }
}

#[async_trait]
impl TransactionRepository for InMemoryTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let stored = self.store.insert(tx).await?;
        self.by_merchant_order
            .write()
            .await
            .entry((tx.merchant_id.clone(), tx.merchant_order_id.clone()))
            .or_default()
            .push(tx.id);
        Ok(stored)
    }

    async fn list_by_merchant_order(
        &self,
        merchant_id: &str,
        merchant_order_id: &str,
    ) -> RepositoryResult<Vec<Transaction>> {
        let ids = self
            .by_merchant_order
            .read()
            .await
            .get(&(merchant_id.to_string(), merchant_order_id.to_string()))
            .cloned()
            .unwrap_or_default();

        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(tx) = self.store.get(id).await {
                found.push(tx);
            }
        }
        found.sort_by_key(|tx| tx.created_at);
        Ok(found)
    }

    async fn list_unacknowledged(&self, limit: i64) -> RepositoryResult<Vec<Transaction>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .store
            .scan(limit, |tx| tx.pending_notification().is_some())
            .await)
    }
}

#[derive(Default, Clone)]
pub struct InMemorySessionRepository {
    store: Arc<InMemoryStore<PaymentSession>>,
    by_trace: Arc<Mutex<HashMap<TraceKey, Uuid>>>,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions for a trace triple; at most one.
    pub async fn count_for_trace(&self, trace: &TraceKey) -> usize {
        self.store
            .scan(usize::MAX, |s| &s.trace_key() == trace)
            .await
            .len()
    }
}

#[async_trait]
impl Repository<PaymentSession> for InMemorySessionRepository {
    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<PaymentSession> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| RepositoryError::NotFound(format!("payment session {}", id)))
    }

    async fn compare_and_swap(
        &self,
        expected_version: i64,
        next: &PaymentSession,
    ) -> RepositoryResult<PaymentSession> {
        self.store.compare_and_swap(expected_version, next).await
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert_if_absent(
        &self,
        session: &PaymentSession,
    ) -> RepositoryResult<(PaymentSession, bool)> {
        // Held across the insert so two racing inits see one winner.
        let mut by_trace = self.by_trace.lock().await;
        let key = session.trace_key();

        if let Some(existing_id) = by_trace.get(&key) {
            let existing = self.get_by_id(*existing_id).await?;
            return Ok((existing, false));
        }

        let stored = self.store.insert(session).await?;
        by_trace.insert(key, stored.id);
        Ok((stored, true))
    }

    async fn find_by_trace(&self, trace: &TraceKey) -> RepositoryResult<Option<PaymentSession>> {
        let id = self.by_trace.lock().await.get(trace).copied();
        match id {
            Some(id) => Ok(self.store.get(id).await),
            None => Ok(None),
        }
    }

    async fn list_needing_attention(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> RepositoryResult<Vec<PaymentSession>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .store
            .scan(limit, |s| {
                s.is_past_ttl(now)
                    || (s.status != PaymentStatus::Created && s.pending_notification().is_some())
            })
            .await)
    }
}
