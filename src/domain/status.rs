use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionStatus {
    Created,
    Redirected,
    Paid,
    Failed,
    Error,
}

impl TransactionStatus {
    /// Forward edges of the transaction state machine.
    const TRANSITIONS: &'static [(TransactionStatus, TransactionStatus)] = &[
        (TransactionStatus::Created, TransactionStatus::Redirected),
        (TransactionStatus::Created, TransactionStatus::Error),
        (TransactionStatus::Redirected, TransactionStatus::Paid),
        (TransactionStatus::Redirected, TransactionStatus::Failed),
        (TransactionStatus::Redirected, TransactionStatus::Error),
    ];

    /// Statuses the switch must deliver to the merchant.
    pub const NOTIFIABLE: &'static [TransactionStatus] = &[
        TransactionStatus::Paid,
        TransactionStatus::Failed,
        TransactionStatus::Error,
    ];

    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        Self::TRANSITIONS.contains(&(self, next))
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Paid | TransactionStatus::Failed | TransactionStatus::Error
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionStatus::Created => "Created",
            TransactionStatus::Redirected => "Redirected",
            TransactionStatus::Paid => "Paid",
            TransactionStatus::Failed => "Failed",
            TransactionStatus::Error => "Error",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(TransactionStatus::Created),
            "Redirected" => Ok(TransactionStatus::Redirected),
            "Paid" => Ok(TransactionStatus::Paid),
            "Failed" => Ok(TransactionStatus::Failed),
            "Error" => Ok(TransactionStatus::Error),
            other => Err(format!("unknown transaction status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Created,
    Paid,
    Failed,
    Expired,
}

impl PaymentStatus {
    /// Statuses the bank must deliver to the switch.
    pub const NOTIFIABLE: &'static [PaymentStatus] =
        &[PaymentStatus::Paid, PaymentStatus::Failed, PaymentStatus::Expired];

    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Created)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Created => "Created",
            PaymentStatus::Paid => "Paid",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Expired => "Expired",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(PaymentStatus::Created),
            "Paid" => Ok(PaymentStatus::Paid),
            "Failed" => Ok(PaymentStatus::Failed),
            "Expired" => Ok(PaymentStatus::Expired),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    Card,
    Qr,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Card => "Card",
            PaymentMethod::Qr => "Qr",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Card" => Ok(PaymentMethod::Card),
            "Qr" => Ok(PaymentMethod::Qr),
            other => Err(format!("unknown payment method: {}", other)),
        }
    }
}

/// Which of the three merchant callback sinks receives an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackKind {
    Success,
    Fail,
    Error,
}

impl CallbackKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CallbackKind::Success => "success",
            CallbackKind::Fail => "fail",
            CallbackKind::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_status_moves_only_forward() {
        use TransactionStatus::*;
        assert!(Created.can_transition_to(Redirected));
        assert!(Created.can_transition_to(Error));
        assert!(Redirected.can_transition_to(Paid));
        assert!(Redirected.can_transition_to(Failed));
        assert!(!Created.can_transition_to(Paid));
        assert!(!Paid.can_transition_to(Failed));
        assert!(!Redirected.can_transition_to(Created));
        assert!(!Error.can_transition_to(Redirected));
    }

    #[test]
    fn statuses_round_trip_through_text() {
        for status in [
            TransactionStatus::Created,
            TransactionStatus::Redirected,
            TransactionStatus::Paid,
            TransactionStatus::Failed,
            TransactionStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<TransactionStatus>().unwrap(), status);
        }
        assert!("Settled".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn serde_uses_variant_names() {
        assert_eq!(serde_json::to_string(&PaymentStatus::Expired).unwrap(), "\"Expired\"");
        assert_eq!(serde_json::to_string(&CallbackKind::Fail).unwrap(), "\"fail\"");
    }
}
