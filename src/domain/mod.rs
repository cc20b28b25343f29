//! Domain entities and their state machines.
//! Framework-agnostic; nothing here performs I/O.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

pub mod notification;
pub mod order;
pub mod payment_session;
pub mod status;
pub mod status_map;
pub mod transaction;

pub use notification::{Notifiable, NotificationLedger};
pub use order::OrderRecord;
pub use payment_session::{PaymentSession, TraceKey};
pub use status::{CallbackKind, PaymentMethod, PaymentStatus, TransactionStatus};
pub use transaction::{CallbackUrls, NewTransaction, Transaction};

/// A stored entity with an optimistic-concurrency version token.
pub trait Record: Clone + PartialEq + Send + Sync + 'static {
    fn id(&self) -> Uuid;
    fn version(&self) -> i64;
    fn set_version(&mut self, version: i64);
    fn touch(&mut self, at: DateTime<Utc>);
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("cannot move from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("a bank session is already bound to this transaction")]
    BankSessionAlreadyBound,

    #[error("payment already attempted")]
    AlreadyAttempted,

    #[error("payment session expired")]
    SessionExpired,

    #[error("outcome already recorded as {0}")]
    OutcomeConflict(String),
}

impl From<DomainError> for crate::error::AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::SessionExpired => crate::error::AppError::Expired(err.to_string()),
            other => crate::error::AppError::Conflict(other.to_string()),
        }
    }
}
