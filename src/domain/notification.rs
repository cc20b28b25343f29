//! Per-status delivery bookkeeping shared by the switch→merchant and
//! bank→switch hops.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt::Debug;

use super::Record;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationLedger<S> {
    /// Last status the downstream party acknowledged.
    pub last_notified_status: Option<S>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub notified_at: Option<DateTime<Utc>>,
    /// Set while a delivery is in flight; other callers back off until then.
    pub claimed_until: Option<DateTime<Utc>>,
}

impl<S> Default for NotificationLedger<S> {
    fn default() -> Self {
        Self {
            last_notified_status: None,
            attempts: 0,
            last_error: None,
            notified_at: None,
            claimed_until: None,
        }
    }
}

impl<S: Copy + PartialEq> NotificationLedger<S> {
    /// The status still owed downstream, if any.
    pub fn pending(&self, current: S, notifiable: &[S]) -> Option<S> {
        if notifiable.contains(&current) && self.last_notified_status != Some(current) {
            Some(current)
        } else {
            None
        }
    }

    pub fn is_acknowledged(&self, current: S) -> bool {
        self.last_notified_status == Some(current)
    }

    pub fn is_claimed(&self, now: DateTime<Utc>) -> bool {
        self.claimed_until.is_some_and(|until| now < until)
    }

    /// Counts an attempt and claims the delivery for `lease`.
    pub fn record_attempt(&mut self, now: DateTime<Utc>, lease: Duration) {
        self.attempts += 1;
        self.claimed_until = Some(now + lease);
    }

    pub fn record_success(&mut self, status: S, at: DateTime<Utc>) {
        self.last_notified_status = Some(status);
        self.notified_at = Some(at);
        self.last_error = None;
        self.claimed_until = None;
    }

    /// Acknowledgment is left untouched so the next access retries.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.claimed_until = None;
    }
}

/// An entity whose status changes are propagated downstream.
pub trait Notifiable: Record {
    type Status: Copy + PartialEq + Debug + Send + Sync + 'static;

    const NOTIFIABLE: &'static [Self::Status];

    fn current_status(&self) -> Self::Status;
    fn ledger(&self) -> &NotificationLedger<Self::Status>;
    fn ledger_mut(&mut self) -> &mut NotificationLedger<Self::Status>;

    fn pending_notification(&self) -> Option<Self::Status> {
        self.ledger().pending(self.current_status(), Self::NOTIFIABLE)
    }
}
