//! The switch: owns the canonical transaction, opens bank sessions on demand
//! and delivers the final outcome to the merchant.

use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::{join_url, BankGateway, MerchantNotifier};
use crate::clock::Clock;
use crate::contracts::{
    BankInitRequest, BankNotification, MerchantCallback, StartPaymentResponse, SwitchInitRequest,
    SwitchInitResponse,
};
use crate::domain::status_map::{callback_for, transaction_status_for};
use crate::domain::{
    CallbackKind, CallbackUrls, NewTransaction, Notifiable, PaymentMethod, Transaction,
    TransactionStatus,
};
use crate::error::AppError;
use crate::ports::{mutate, Repository, TransactionRepository};
use crate::services::notifier::{deliver_pending, DeliveryOutcome};
use crate::validation::{
    normalize_currency, require, sanitize_string, validate_callback_url, validate_identifier,
    validate_positive_amount, MERCHANT_ID_MAX_LEN, ORDER_ID_MAX_LEN,
};

const STAN_DIGITS: u32 = 6;

/// Pre-provisioned merchant credentials.
#[derive(Clone, Default)]
pub struct MerchantRegistry {
    secrets: HashMap<String, String>,
}

impl MerchantRegistry {
    pub fn new(secrets: HashMap<String, String>) -> Self {
        Self { secrets }
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    /// Constant-time comparison against the stored secret. Unknown merchants
    /// and wrong secrets get the same error.
    pub fn verify(&self, merchant_id: &str, secret: &str) -> Result<(), AppError> {
        let matches = self
            .secrets
            .get(merchant_id)
            .map(|expected| bool::from(expected.as_bytes().ct_eq(secret.as_bytes())))
            .unwrap_or(false);

        if matches {
            Ok(())
        } else {
            Err(AppError::Unauthorized("invalid merchant credentials".to_string()))
        }
    }
}

impl fmt::Debug for MerchantRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantRegistry")
            .field("merchants", &self.secrets.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SwitchSettings {
    /// Merchant id the bank expects in every init call.
    pub bank_merchant_id: String,
    pub checkout_base_url: String,
}

#[derive(Clone)]
pub struct SwitchService {
    transactions: Arc<dyn TransactionRepository>,
    bank: Arc<dyn BankGateway>,
    merchant: Arc<dyn MerchantNotifier>,
    registry: Arc<MerchantRegistry>,
    clock: Arc<dyn Clock>,
    settings: SwitchSettings,
}

impl SwitchService {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        bank: Arc<dyn BankGateway>,
        merchant: Arc<dyn MerchantNotifier>,
        registry: MerchantRegistry,
        clock: Arc<dyn Clock>,
        settings: SwitchSettings,
    ) -> Self {
        Self {
            transactions,
            bank,
            merchant,
            registry: Arc::new(registry),
            clock,
            settings,
        }
    }

    pub fn checkout_url(&self, transaction_id: Uuid) -> String {
        join_url(
            &self.settings.checkout_base_url,
            &format!("/api/switch/checkout/{}", transaction_id),
        )
    }

    /// Creates a new transaction. Repeated merchant inits are not deduplicated;
    /// each one opens an independent transaction.
    pub async fn init(&self, req: SwitchInitRequest) -> Result<SwitchInitResponse, AppError> {
        let merchant_id = sanitize_string(&require("merchant_id", req.merchant_id)?);
        validate_identifier("merchant_id", &merchant_id, MERCHANT_ID_MAX_LEN)?;
        let secret = require("merchant_secret", req.merchant_secret)?;
        let amount = require("amount", req.amount)?;
        validate_positive_amount(&amount)?;
        let currency = normalize_currency(&require("currency", req.currency)?)?;
        let order_id = sanitize_string(&require("order_id", req.order_id)?);
        validate_identifier("order_id", &order_id, ORDER_ID_MAX_LEN)?;
        let merchant_timestamp = require("timestamp", req.timestamp)?;
        let callbacks = CallbackUrls {
            success_url: require("success_url", req.success_url)?,
            fail_url: require("fail_url", req.fail_url)?,
            error_url: require("error_url", req.error_url)?,
        };
        validate_callback_url("success_url", &callbacks.success_url)?;
        validate_callback_url("fail_url", &callbacks.fail_url)?;
        validate_callback_url("error_url", &callbacks.error_url)?;

        if let Err(e) = self.registry.verify(&merchant_id, &secret) {
            warn!(merchant_id = %merchant_id, "merchant authentication failed");
            return Err(e);
        }

        let tx = Transaction::new(
            NewTransaction {
                merchant_id,
                merchant_order_id: order_id,
                merchant_timestamp,
                amount,
                currency,
                callbacks,
            },
            self.clock.now(),
        );
        let tx = self.transactions.insert(&tx).await?;

        info!(
            transaction_id = %tx.id,
            merchant_id = %tx.merchant_id,
            order_id = %tx.merchant_order_id,
            amount = %tx.amount,
            currency = %tx.currency,
            "transaction created"
        );

        Ok(SwitchInitResponse {
            transaction_id: tx.id,
            checkout_url: self.checkout_url(tx.id),
        })
    }

    /// Reads a transaction. A pending merchant notification is retried first.
    pub async fn get(&self, id: Uuid) -> Result<Transaction, AppError> {
        let tx = self.transactions.get_by_id(id).await?;
        if tx.pending_notification().is_none() {
            return Ok(tx);
        }
        Ok(self.notify_merchant_quietly(id).await.unwrap_or(tx))
    }

    pub async fn find_by_order(
        &self,
        merchant_id: &str,
        order_id: &str,
    ) -> Result<Vec<Transaction>, AppError> {
        Ok(self
            .transactions
            .list_by_merchant_order(merchant_id, order_id)
            .await?)
    }

    /// Opens the bank session for `id`. The trace is persisted before the
    /// bank is called, so a retry after a lost response reuses it and the
    /// bank returns the same session.
    pub async fn start_payment(
        &self,
        id: Uuid,
        method: PaymentMethod,
    ) -> Result<StartPaymentResponse, AppError> {
        let now = self.clock.now();
        let (tx, (stan, switch_timestamp)) = mutate(&*self.transactions, id, now, |tx: &mut Transaction| {
            if tx.bank_payment_id.is_some() {
                return Err(AppError::Conflict(
                    "a bank session is already open for this transaction".to_string(),
                ));
            }
            if tx.status != TransactionStatus::Created {
                return Err(AppError::Conflict(format!("transaction is {}", tx.status)));
            }
            let trace = tx.ensure_trace(generate_stan, now);
            tx.payment_method = Some(method);
            Ok(trace)
        })
        .await?;

        info!(
            transaction_id = %id,
            stan = %stan,
            method = method.as_str(),
            "requesting bank session"
        );

        let request = BankInitRequest {
            merchant_id: Some(self.settings.bank_merchant_id.clone()),
            amount: Some(tx.amount.clone()),
            currency: Some(tx.currency.clone()),
            stan: Some(stan),
            switch_timestamp: Some(switch_timestamp),
            transaction_id: Some(tx.id),
        };

        let session = match self.bank.init_session(&request).await {
            Ok(session) => session,
            Err(e) => {
                error!(transaction_id = %id, error = %e, "bank session creation failed");
                self.escalate_to_error(id).await?;
                self.notify_merchant_quietly(id).await;
                return Err(e.into());
            }
        };

        mutate(&*self.transactions, id, self.clock.now(), |tx: &mut Transaction| {
            tx.attach_bank_session(session.payment_id)
                .map_err(AppError::from)
        })
        .await?;

        info!(
            transaction_id = %id,
            session_id = %session.payment_id,
            status = TransactionStatus::Redirected.as_str(),
            "transaction redirected to bank"
        );

        Ok(StartPaymentResponse {
            transaction_id: id,
            bank_payment_id: session.payment_id,
            payment_url: session.payment_url,
        })
    }

    async fn escalate_to_error(&self, id: Uuid) -> Result<(), AppError> {
        // A concurrent start may have bound a session meanwhile; leave it alone.
        mutate(&*self.transactions, id, self.clock.now(), |tx: &mut Transaction| {
            if tx.bank_payment_id.is_none() && tx.status.can_transition_to(TransactionStatus::Error) {
                tx.transition(TransactionStatus::Error)?;
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    /// Applies a bank status report and forwards the outcome to the merchant.
    pub async fn handle_bank_notification(
        &self,
        notification: BankNotification,
    ) -> Result<Transaction, AppError> {
        let mapped = transaction_status_for(&notification.status);
        let (_, applied) = mutate(
            &*self.transactions,
            notification.transaction_id,
            self.clock.now(),
            |tx: &mut Transaction| {
                if tx.bank_payment_id != Some(notification.session_id) {
                    return Err(AppError::Conflict(format!(
                        "session {} is not bound to transaction {}",
                        notification.session_id, tx.id
                    )));
                }
                if tx.stan.as_deref() != Some(notification.stan.as_str()) {
                    return Err(AppError::Validation("stan: does not match".to_string()));
                }
                if tx.status == mapped {
                    return Ok(false);
                }
                if tx.status != TransactionStatus::Redirected {
                    return Err(AppError::Conflict(format!(
                        "transaction is already {}",
                        tx.status
                    )));
                }
                tx.transition(mapped)?;
                Ok(true)
            },
        )
        .await?;

        if applied {
            info!(
                transaction_id = %notification.transaction_id,
                session_id = %notification.session_id,
                bank_status = %notification.status,
                status = mapped.as_str(),
                "bank outcome applied"
            );
        }

        self.get(notification.transaction_id).await
    }

    /// Re-runs merchant delivery on demand and returns the bookkeeping.
    pub async fn renotify_merchant(
        &self,
        id: Uuid,
    ) -> Result<(Transaction, DeliveryOutcome<TransactionStatus>), AppError> {
        self.notify_merchant(id).await
    }

    /// Retries every unacknowledged merchant notification, up to `limit`.
    /// Returns how many were delivered.
    pub async fn reconcile_pending(&self, limit: i64) -> Result<usize, AppError> {
        let pending = self.transactions.list_unacknowledged(limit).await?;
        let mut delivered = 0;
        for tx in pending {
            match self.notify_merchant(tx.id).await {
                Ok((_, outcome)) if outcome.is_delivered() => delivered += 1,
                Ok(_) => {}
                Err(e) => warn!(transaction_id = %tx.id, error = %e, "reconcile failed"),
            }
        }
        Ok(delivered)
    }

    async fn notify_merchant(
        &self,
        id: Uuid,
    ) -> Result<(Transaction, DeliveryOutcome<TransactionStatus>), AppError> {
        let merchant = self.merchant.clone();
        deliver_pending(&*self.transactions, id, self.clock.now(), |tx: Transaction| async move {
            let kind = callback_for(tx.status).unwrap_or(CallbackKind::Error);
            let callback = MerchantCallback {
                transaction_id: tx.id,
                bank_payment_id: tx.bank_payment_id,
                status: tx.status,
                merchant_order_id: tx.merchant_order_id.clone(),
            };
            merchant.deliver(tx.callbacks.url_for(kind), &callback).await
        })
        .await
    }

    /// Delivery errors are already recorded on the transaction; repository
    /// errors after the committed transition are only logged.
    async fn notify_merchant_quietly(&self, id: Uuid) -> Option<Transaction> {
        match self.notify_merchant(id).await {
            Ok((tx, _)) => Some(tx),
            Err(e) => {
                warn!(transaction_id = %id, error = %e, "merchant notification bookkeeping failed");
                None
            }
        }
    }
}

fn generate_stan() -> String {
    let max = 10u32.pow(STAN_DIGITS);
    let value = rand::thread_rng().gen_range(0..max);
    format!("{:0width$}", value, width = STAN_DIGITS as usize)
}
