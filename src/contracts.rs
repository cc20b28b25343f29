//! Wire types exchanged between the merchant, the switch and the bank.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{
    CallbackKind, NotificationLedger, PaymentMethod, PaymentSession, PaymentStatus, Transaction,
    TransactionStatus,
};

/// Merchant → Switch init. Fields are optional so missing ones surface as
/// validation errors instead of body rejections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwitchInitRequest {
    pub merchant_id: Option<String>,
    pub merchant_secret: Option<String>,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub order_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub success_url: Option<String>,
    pub fail_url: Option<String>,
    pub error_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchInitResponse {
    pub transaction_id: Uuid,
    pub checkout_url: String,
}

/// Switch → Bank init.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BankInitRequest {
    pub merchant_id: Option<String>,
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub stan: Option<String>,
    pub switch_timestamp: Option<DateTime<Utc>>,
    pub transaction_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankInitResponse {
    pub payment_id: Uuid,
    pub payment_url: String,
}

/// Bank → Switch status notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BankNotification {
    pub transaction_id: Uuid,
    pub session_id: Uuid,
    pub status: String,
    pub stan: String,
    pub bank_timestamp: DateTime<Utc>,
}

/// Switch → Merchant outcome callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerchantCallback {
    pub transaction_id: Uuid,
    pub bank_payment_id: Option<Uuid>,
    pub status: TransactionStatus,
    pub merchant_order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartPaymentResponse {
    pub transaction_id: Uuid,
    pub bank_payment_id: Uuid,
    pub payment_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CardSubmitRequest {
    pub pan: String,
    pub expiry_month: u32,
    pub expiry_year: i32,
    pub cvv: String,
    #[serde(default)]
    pub cardholder_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QrConfirmRequest {
    #[serde(default)]
    pub qr_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionResponse {
    pub payment_id: Uuid,
    pub status: PaymentStatus,
    pub message: String,
}

/// Merchant-facing purchase request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub amount: Option<BigDecimal>,
    pub currency: Option<String>,
    pub order_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub transaction_id: Uuid,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackAck {
    pub transaction_id: Uuid,
    pub kind: CallbackKind,
    pub status: TransactionStatus,
    pub newly_recorded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderQuery {
    pub merchant_id: String,
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationView<S> {
    pub last_notified_status: Option<S>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub notified_at: Option<DateTime<Utc>>,
}

impl<S: Copy> From<&NotificationLedger<S>> for NotificationView<S> {
    fn from(ledger: &NotificationLedger<S>) -> Self {
        Self {
            last_notified_status: ledger.last_notified_status,
            attempts: ledger.attempts,
            last_error: ledger.last_error.clone(),
            notified_at: ledger.notified_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionView {
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
    pub merchant_notified: bool,
    pub notification: NotificationView<TransactionStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Transaction> for TransactionView {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            merchant_id: tx.merchant_id.clone(),
            merchant_order_id: tx.merchant_order_id.clone(),
            merchant_timestamp: tx.merchant_timestamp,
            amount: tx.amount.clone(),
            currency: tx.currency.clone(),
            stan: tx.stan.clone(),
            switch_timestamp: tx.switch_timestamp,
            status: tx.status,
            payment_method: tx.payment_method,
            bank_payment_id: tx.bank_payment_id,
            merchant_notified: tx.merchant_notified(),
            notification: NotificationView::from(&tx.merchant_notification),
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
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
    pub notification: NotificationView<PaymentStatus>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&PaymentSession> for SessionView {
    fn from(session: &PaymentSession) -> Self {
        Self {
            id: session.id,
            switch_transaction_id: session.switch_transaction_id,
            merchant_id: session.merchant_id.clone(),
            stan: session.stan.clone(),
            switch_timestamp: session.switch_timestamp,
            amount: session.amount.clone(),
            currency: session.currency.clone(),
            status: session.status,
            attempted: session.attempted,
            payment_method: session.payment_method,
            expires_at: session.expires_at,
            notification: NotificationView::from(&session.switch_notification),
            created_at: session.created_at,
            updated_at: session.updated_at,
        }
    }
}
