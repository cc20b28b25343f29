//! Payment session domain entity, owned by the bank.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::notification::{Notifiable, NotificationLedger};
use super::status::{PaymentMethod, PaymentStatus};
use super::{DomainError, Record};

/// Idempotency key for session initiation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceKey {
    pub merchant_id: String,
    pub stan: String,
    pub switch_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSession {
    pub id: Uuid,
    pub switch_transaction_id: Uuid,
    pub merchant_id: String,
    pub stan: String,
    pub switch_timestamp: DateTime<Utc>,
    pub amount: BigDecimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub attempted: bool,
    pub payment_method: Option<PaymentMethod>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub switch_notification: NotificationLedger<PaymentStatus>,
    pub version: i64,
}

impl PaymentSession {
    pub fn new(
        trace: TraceKey,
        switch_transaction_id: Uuid,
        amount: BigDecimal,
        currency: String,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            switch_transaction_id,
            merchant_id: trace.merchant_id,
            stan: trace.stan,
            switch_timestamp: trace.switch_timestamp,
            amount,
            currency,
            status: PaymentStatus::Created,
            attempted: false,
            payment_method: None,
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
            switch_notification: NotificationLedger::default(),
            version: 0,
        }
    }

    pub fn trace_key(&self) -> TraceKey {
        TraceKey {
            merchant_id: self.merchant_id.clone(),
            stan: self.stan.clone(),
            switch_timestamp: self.switch_timestamp,
        }
    }

    pub fn is_past_ttl(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Created && now > self.expires_at
    }

    /// Applies the lazy `Created → Expired` transition. Returns whether it fired.
    pub fn expire_if_due(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_past_ttl(now) {
            self.status = PaymentStatus::Expired;
            true
        } else {
            false
        }
    }

    /// Guards for a submission: not expired, not yet attempted.
    pub fn ensure_submittable(&self) -> Result<(), DomainError> {
        if self.status == PaymentStatus::Expired {
            return Err(DomainError::SessionExpired);
        }
        if self.attempted || self.status != PaymentStatus::Created {
            return Err(DomainError::AlreadyAttempted);
        }
        Ok(())
    }

    /// Consumes the one-time attempt with an authorization outcome.
    pub fn record_submission(
        &mut self,
        method: PaymentMethod,
        outcome: PaymentStatus,
    ) -> Result<(), DomainError> {
        self.ensure_submittable()?;
        if !matches!(outcome, PaymentStatus::Paid | PaymentStatus::Failed) {
            return Err(DomainError::InvalidTransition {
                from: self.status.to_string(),
                to: outcome.to_string(),
            });
        }
        self.attempted = true;
        self.payment_method = Some(method);
        self.status = outcome;
        Ok(())
    }

    /// `attempted` implies Paid/Failed; not attempted implies Created/Expired.
    pub fn invariant_holds(&self) -> bool {
        if self.attempted {
            matches!(self.status, PaymentStatus::Paid | PaymentStatus::Failed)
        } else {
            matches!(self.status, PaymentStatus::Created | PaymentStatus::Expired)
        }
    }
}

impl Record for PaymentSession {
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

impl Notifiable for PaymentSession {
    type Status = PaymentStatus;

    const NOTIFIABLE: &'static [PaymentStatus] = PaymentStatus::NOTIFIABLE;

    fn current_status(&self) -> PaymentStatus {
        self.status
    }

    fn ledger(&self) -> &NotificationLedger<PaymentStatus> {
        &self.switch_notification
    }

    fn ledger_mut(&mut self) -> &mut NotificationLedger<PaymentStatus> {
        &mut self.switch_notification
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(now: DateTime<Utc>) -> PaymentSession {
        PaymentSession::new(
            TraceKey {
                merchant_id: "switch-001".to_string(),
                stan: "000042".to_string(),
                switch_timestamp: now,
            },
            Uuid::new_v4(),
            BigDecimal::from(35),
            "EUR".to_string(),
            Duration::minutes(5),
            now,
        )
    }

    #[test]
    fn new_session_expires_after_ttl() {
        let now = Utc::now();
        let mut s = session(now);
        assert_eq!(s.expires_at, now + Duration::minutes(5));

        assert!(!s.expire_if_due(now + Duration::minutes(4)));
        assert!(s.expire_if_due(now + Duration::minutes(6)));
        assert_eq!(s.status, PaymentStatus::Expired);
        assert!(!s.attempted);
        assert!(s.invariant_holds());
    }

    #[test]
    fn submission_is_one_time() {
        let now = Utc::now();
        let mut s = session(now);

        s.record_submission(PaymentMethod::Card, PaymentStatus::Paid).unwrap();
        assert!(s.attempted);
        assert!(s.invariant_holds());
        assert_eq!(
            s.record_submission(PaymentMethod::Qr, PaymentStatus::Paid),
            Err(DomainError::AlreadyAttempted)
        );
    }

    #[test]
    fn declined_submission_also_consumes_attempt() {
        let mut s = session(Utc::now());
        s.record_submission(PaymentMethod::Card, PaymentStatus::Failed).unwrap();
        assert_eq!(s.status, PaymentStatus::Failed);
        assert_eq!(s.ensure_submittable(), Err(DomainError::AlreadyAttempted));
    }

    #[test]
    fn expired_session_rejects_submission() {
        let now = Utc::now();
        let mut s = session(now);
        s.expire_if_due(now + Duration::minutes(6));

        assert_eq!(
            s.record_submission(PaymentMethod::Card, PaymentStatus::Paid),
            Err(DomainError::SessionExpired)
        );
        assert!(!s.attempted);
    }

    #[test]
    fn expiry_never_applies_after_submission() {
        let now = Utc::now();
        let mut s = session(now);
        s.record_submission(PaymentMethod::Qr, PaymentStatus::Paid).unwrap();
        assert!(!s.expire_if_due(now + Duration::hours(1)));
        assert_eq!(s.status, PaymentStatus::Paid);
    }
}
