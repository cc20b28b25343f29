//! Finite mapping tables between the parties' status vocabularies.

use super::{CallbackKind, PaymentStatus, TransactionStatus};

pub const BANK_TO_TRANSACTION: &[(PaymentStatus, TransactionStatus)] = &[
    (PaymentStatus::Paid, TransactionStatus::Paid),
    (PaymentStatus::Failed, TransactionStatus::Failed),
    (PaymentStatus::Expired, TransactionStatus::Failed),
];

pub const CALLBACK_FOR_STATUS: &[(TransactionStatus, CallbackKind)] = &[
    (TransactionStatus::Paid, CallbackKind::Success),
    (TransactionStatus::Failed, CallbackKind::Fail),
    (TransactionStatus::Error, CallbackKind::Error),
];

/// Maps a bank status as received on the wire. Anything outside the table,
/// including values the switch does not recognise, maps to `Error`.
pub fn transaction_status_for(bank_status: &str) -> TransactionStatus {
    bank_status
        .parse::<PaymentStatus>()
        .ok()
        .and_then(|status| {
            BANK_TO_TRANSACTION
                .iter()
                .find(|(from, _)| *from == status)
                .map(|(_, to)| *to)
        })
        .unwrap_or(TransactionStatus::Error)
}

pub fn callback_for(status: TransactionStatus) -> Option<CallbackKind> {
    CALLBACK_FOR_STATUS
        .iter()
        .find(|(from, _)| *from == status)
        .map(|(_, kind)| *kind)
}

pub fn status_for_callback(kind: CallbackKind) -> TransactionStatus {
    CALLBACK_FOR_STATUS
        .iter()
        .find(|(_, k)| *k == kind)
        .map(|(status, _)| *status)
        .unwrap_or(TransactionStatus::Error)
}
