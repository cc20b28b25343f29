use crate::domain::{PaymentMethod, PaymentSession, PaymentStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationDecision {
    Approved,
    Declined,
}

impl AuthorizationDecision {
    pub fn payment_status(self) -> PaymentStatus {
        match self {
            AuthorizationDecision::Approved => PaymentStatus::Paid,
            AuthorizationDecision::Declined => PaymentStatus::Failed,
        }
    }
}

/// Decides the outcome of a validated submission.
pub trait Authorizer: Send + Sync {
    fn authorize(&self, session: &PaymentSession, method: PaymentMethod) -> AuthorizationDecision;
}

/// Approves every submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

impl Authorizer for ApproveAll {
    fn authorize(&self, _session: &PaymentSession, _method: PaymentMethod) -> AuthorizationDecision {
        AuthorizationDecision::Approved
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineAll;

impl Authorizer for DeclineAll {
    fn authorize(&self, _session: &PaymentSession, _method: PaymentMethod) -> AuthorizationDecision {
        AuthorizationDecision::Declined
    }
}
