//! The merchant's view of a purchase and the outcome reported for it.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::status::TransactionStatus;
use super::{DomainError, Record};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    /// Switch transaction id.
    pub id: Uuid,
    pub merchant_order_id: String,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub redirect_url: Option<String>,
    pub outcome: Option<TransactionStatus>,
    pub bank_payment_id: Option<Uuid>,
    pub callback_deliveries: i32,
    pub outcome_recorded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: i64,
}

impl OrderRecord {
    pub fn placed(
        transaction_id: Uuid,
        merchant_order_id: String,
        amount: BigDecimal,
        currency: String,
        redirect_url: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: transaction_id,
            merchant_order_id,
            amount: Some(amount),
            currency: Some(currency),
            redirect_url: Some(redirect_url),
            outcome: None,
            bank_payment_id: None,
            callback_deliveries: 0,
            outcome_recorded_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// An order we have no local record of, learned from a callback.
    pub fn unsolicited(transaction_id: Uuid, merchant_order_id: String, now: DateTime<Utc>) -> Self {
        Self {
            id: transaction_id,
            merchant_order_id,
            amount: None,
            currency: None,
            redirect_url: None,
            outcome: None,
            bank_payment_id: None,
            callback_deliveries: 0,
            outcome_recorded_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Records a terminal outcome. Repeats of the same outcome only bump the
    /// delivery counter; a different outcome is rejected.
    pub fn record_outcome(
        &mut self,
        status: TransactionStatus,
        bank_payment_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<bool, DomainError> {
        self.callback_deliveries += 1;
        match self.outcome {
            None => {
                self.outcome = Some(status);
                self.bank_payment_id = bank_payment_id.or(self.bank_payment_id);
                self.outcome_recorded_at = Some(now);
                Ok(true)
            }
            Some(existing) if existing == status => Ok(false),
            Some(existing) => Err(DomainError::OutcomeConflict(existing.to_string())),
        }
    }
}

impl Record for OrderRecord {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_outcome_is_idempotent() {
        let now = Utc::now();
        let mut order = OrderRecord::placed(
            Uuid::new_v4(),
            "order-1".to_string(),
            BigDecimal::from(35),
            "EUR".to_string(),
            "http://switch/checkout/1".to_string(),
            now,
        );

        assert_eq!(order.record_outcome(TransactionStatus::Paid, None, now), Ok(true));
        assert_eq!(order.record_outcome(TransactionStatus::Paid, None, now), Ok(false));
        assert_eq!(order.callback_deliveries, 2);
        assert!(order
            .record_outcome(TransactionStatus::Failed, None, now)
            .is_err());
        assert_eq!(order.outcome, Some(TransactionStatus::Paid));
    }
}
