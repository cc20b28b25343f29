//! Transaction domain entity, owned by the switch.

use bigdecimal::BigDecimal;
use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::notification::{Notifiable, NotificationLedger};
use super::status::{CallbackKind, PaymentMethod, TransactionStatus};
use super::{DomainError, Record};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackUrls {
    pub success_url: String,
    pub fail_url: String,
    pub error_url: String,
}

impl CallbackUrls {
    pub fn url_for(&self, kind: CallbackKind) -> &str {
        match kind {
            CallbackKind::Success => &self.success_url,
            CallbackKind::Fail => &self.fail_url,
            CallbackKind::Error => &self.error_url,
        }
    }
}

/// Validated merchant input for a new transaction.
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub merchant_id: String,
    pub merchant_order_id: String,
    pub merchant_timestamp: DateTime<Utc>,
    pub amount: BigDecimal,
    pub currency: String,
    pub callbacks: CallbackUrls,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub merchant_id: String,
    pub merchant_order_id: String,
    pub merchant_timestamp: DateTime<Utc>,
    pub amount: BigDecimal,
    pub currency: String,
    pub stan: Option<String>,
    pub switch_timestamp: Option<DateTime<Utc>>,
    pub status: TransactionStatus,
    pub payment_method: Option<PaymentMethod>,
    pub bank_payment_id: Option<Uuid>,
    pub callbacks: CallbackUrls,
    pub merchant_notification: NotificationLedger<TransactionStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Transaction {
    pub fn new(input: NewTransaction, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            merchant_id: input.merchant_id,
            merchant_order_id: input.merchant_order_id,
            merchant_timestamp: input.merchant_timestamp,
            amount: input.amount,
            currency: input.currency,
            stan: None,
            switch_timestamp: None,
            status: TransactionStatus::Created,
            payment_method: None,
            bank_payment_id: None,
            callbacks: input.callbacks,
            merchant_notification: NotificationLedger::default(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn transition(&mut self, next: TransactionStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Returns the trace pair, generating it with `stan` on first use.
    ///
    /// The timestamp is truncated to microseconds so it compares equal after
    /// a round trip through Postgres.
    pub fn ensure_trace(
        &mut self,
        stan: impl FnOnce() -> String,
        now: DateTime<Utc>,
    ) -> (String, DateTime<Utc>) {
        match (&self.stan, self.switch_timestamp) {
            (Some(stan), Some(ts)) => (stan.clone(), ts),
            _ => {
                let stan = stan();
                let ts = now.trunc_subsecs(6);
                self.stan = Some(stan.clone());
                self.switch_timestamp = Some(ts);
                (stan, ts)
            }
        }
    }

    /// Binds the bank session and moves to `Redirected`. Rebinding the same
    /// session id is a no-op.
    pub fn attach_bank_session(&mut self, bank_payment_id: Uuid) -> Result<(), DomainError> {
        match self.bank_payment_id {
            Some(existing) if existing == bank_payment_id => Ok(()),
            Some(_) => Err(DomainError::BankSessionAlreadyBound),
            None => {
                self.transition(TransactionStatus::Redirected)?;
                self.bank_payment_id = Some(bank_payment_id);
                Ok(())
            }
        }
    }

    pub fn merchant_notified(&self) -> bool {
        self.merchant_notification.is_acknowledged(self.status)
    }
}

impl Record for Transaction {
    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

impl Notifiable for Transaction {
    type Status = TransactionStatus;

    const NOTIFIABLE: &'static [TransactionStatus] = TransactionStatus::NOTIFIABLE;

    fn current_status(&self) -> TransactionStatus {
        self.status
    }

    fn ledger(&self) -> &NotificationLedger<TransactionStatus> {
        &self.merchant_notification
    }

    fn ledger_mut(&mut self) -> &mut NotificationLedger<TransactionStatus> {
        &mut self.merchant_notification
    }
}
