//! The bank: owns the payment session, enforces its one-time and time-limited
//! use, and reports status changes back to the switch.

use chrono::Duration;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::{join_url, ClientError, SwitchNotifier};
use crate::clock::Clock;
use crate::contracts::{
    BankInitRequest, BankInitResponse, BankNotification, CardSubmitRequest, QrConfirmRequest,
};
use crate::domain::{Notifiable, PaymentMethod, PaymentSession, PaymentStatus, TraceKey};
use crate::error::AppError;
use crate::ports::{mutate, Repository, SessionRepository};
use crate::services::authorization::Authorizer;
use crate::services::notifier::{deliver_pending, DeliveryOutcome};
use crate::validation::{
    normalize_currency, require, sanitize_string, validate_card, validate_identifier,
    validate_max_len, validate_positive_amount, validate_stan, MERCHANT_ID_MAX_LEN,
};

const QR_REFERENCE_MAX_LEN: usize = 128;

#[derive(Debug, Clone)]
pub struct BankSettings {
    /// The only merchant id accepted on init.
    pub trusted_merchant_id: String,
    pub payment_base_url: String,
    pub session_ttl: Duration,
}

#[derive(Clone)]
pub struct BankService {
    sessions: Arc<dyn SessionRepository>,
    switch: Arc<dyn SwitchNotifier>,
    authorizer: Arc<dyn Authorizer>,
    clock: Arc<dyn Clock>,
    settings: BankSettings,
}

impl BankService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        switch: Arc<dyn SwitchNotifier>,
        authorizer: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
        settings: BankSettings,
    ) -> Self {
        Self {
            sessions,
            switch,
            authorizer,
            clock,
            settings,
        }
    }

    pub fn payment_url(&self, session_id: Uuid) -> String {
        join_url(
            &self.settings.payment_base_url,
            &format!("/api/bank/payments/{}", session_id),
        )
    }

    fn response_for(&self, session: &PaymentSession) -> BankInitResponse {
        BankInitResponse {
            payment_id: session.id,
            payment_url: self.payment_url(session.id),
        }
    }

    /// Opens a session, or returns the existing one for the same trace triple.
    pub async fn init(&self, req: BankInitRequest) -> Result<BankInitResponse, AppError> {
        let merchant_id = sanitize_string(&require("merchant_id", req.merchant_id)?);
        validate_identifier("merchant_id", &merchant_id, MERCHANT_ID_MAX_LEN)?;
        let trusted = self.settings.trusted_merchant_id.as_bytes();
        if !bool::from(trusted.ct_eq(merchant_id.as_bytes())) {
            warn!(merchant_id = %merchant_id, "bank init from untrusted merchant");
            return Err(AppError::Unauthorized("unknown merchant".to_string()));
        }

        let amount = require("amount", req.amount)?;
        validate_positive_amount(&amount)?;
        let currency = normalize_currency(&require("currency", req.currency)?)?;
        let stan = require("stan", req.stan)?;
        validate_stan(&stan)?;
        let switch_timestamp = require("switch_timestamp", req.switch_timestamp)?;
        let transaction_id = require("transaction_id", req.transaction_id)?;

        let trace = TraceKey {
            merchant_id,
            stan,
            switch_timestamp,
        };

        if let Some(existing) = self.sessions.find_by_trace(&trace).await? {
            self.warn_on_replay_mismatch(&existing, transaction_id, &amount, &currency);
            info!(session_id = %existing.id, stan = %trace.stan, "bank init replayed");
            return Ok(self.response_for(&existing));
        }

        let now = self.clock.now();
        let candidate = PaymentSession::new(
            trace,
            transaction_id,
            amount.clone(),
            currency.clone(),
            self.settings.session_ttl,
            now,
        );
        let (session, created) = self.sessions.insert_if_absent(&candidate).await?;

        if created {
            info!(
                session_id = %session.id,
                transaction_id = %transaction_id,
                stan = %session.stan,
                expires_at = %session.expires_at,
                "payment session created"
            );
        } else {
            self.warn_on_replay_mismatch(&session, transaction_id, &amount, &currency);
        }

        Ok(self.response_for(&session))
    }

    fn warn_on_replay_mismatch(
        &self,
        existing: &PaymentSession,
        transaction_id: Uuid,
        amount: &bigdecimal::BigDecimal,
        currency: &str,
    ) {
        if existing.switch_transaction_id != transaction_id
            || &existing.amount != amount
            || existing.currency != currency
        {
            warn!(
                session_id = %existing.id,
                stan = %existing.stan,
                "bank init replay differs from the stored session; returning the stored one"
            );
        }
    }

    /// Reads a session, applying lazy expiry and retrying a pending switch
    /// notification.
    pub async fn get_status(&self, id: Uuid) -> Result<PaymentSession, AppError> {
        let session = self.expire_if_due(id).await?;
        if session.pending_notification().is_none() {
            return Ok(session);
        }
        Ok(self.notify_switch_quietly(id).await.unwrap_or(session))
    }

    pub async fn submit_card(
        &self,
        id: Uuid,
        req: CardSubmitRequest,
    ) -> Result<PaymentSession, AppError> {
        let now = self.clock.now();
        self.submit(id, PaymentMethod::Card, || {
            validate_card(&req.pan, req.expiry_month, req.expiry_year, &req.cvv, now)?;
            Ok(())
        })
        .await
    }

    pub async fn confirm_qr(
        &self,
        id: Uuid,
        req: QrConfirmRequest,
    ) -> Result<PaymentSession, AppError> {
        self.submit(id, PaymentMethod::Qr, || {
            if let Some(reference) = &req.qr_reference {
                validate_max_len("qr_reference", reference, QR_REFERENCE_MAX_LEN)?;
            }
            Ok(())
        })
        .await
    }

    /// Checks in order: expiry, the one-time guard, the payload, then
    /// authorization. Only authorization consumes the attempt, and only if the
    /// session is still within its TTL when the outcome is committed.
    async fn submit<V>(
        &self,
        id: Uuid,
        method: PaymentMethod,
        validate_payload: V,
    ) -> Result<PaymentSession, AppError>
    where
        V: FnOnce() -> Result<(), AppError>,
    {
        let session = self.expire_if_due(id).await?;
        if session.status == PaymentStatus::Expired {
            self.notify_switch_quietly(id).await;
            return Err(AppError::Expired("payment session expired".to_string()));
        }

        session.ensure_submittable()?;
        validate_payload()?;

        let outcome = self.authorizer.authorize(&session, method).payment_status();

        let decided_at = self.clock.now();
        let (_, committed) = mutate(&*self.sessions, id, decided_at, |s: &mut PaymentSession| {
            if s.expire_if_due(decided_at) {
                return Ok(false);
            }
            s.record_submission(method, outcome)?;
            Ok(true)
        })
        .await?;

        if !committed {
            info!(
                session_id = %id,
                status = PaymentStatus::Expired.as_str(),
                "payment session expired during authorization"
            );
            self.notify_switch_quietly(id).await;
            return Err(AppError::Expired("payment session expired".to_string()));
        }

        info!(
            session_id = %id,
            method = method.as_str(),
            status = outcome.as_str(),
            "payment submitted"
        );

        match self.notify_switch_quietly(id).await {
            Some(session) => Ok(session),
            None => Ok(self.sessions.get_by_id(id).await?),
        }
    }

    /// Re-runs switch delivery on demand and returns the bookkeeping.
    pub async fn renotify_switch(
        &self,
        id: Uuid,
    ) -> Result<(PaymentSession, DeliveryOutcome<PaymentStatus>), AppError> {
        self.expire_if_due(id).await?;
        self.notify_switch(id).await
    }

    /// Expires stale sessions and retries unacknowledged switch notifications,
    /// up to `limit`. Returns how many notifications were delivered.
    pub async fn reconcile_pending(&self, limit: i64) -> Result<usize, AppError> {
        let now = self.clock.now();
        let stale = self.sessions.list_needing_attention(now, limit).await?;
        let mut delivered = 0;
        for session in stale {
            if let Err(e) = self.expire_if_due(session.id).await {
                warn!(session_id = %session.id, error = %e, "reconcile expiry failed");
                continue;
            }
            match self.notify_switch(session.id).await {
                Ok((_, outcome)) if outcome.is_delivered() => delivered += 1,
                Ok(_) => {}
                Err(e) => warn!(session_id = %session.id, error = %e, "reconcile failed"),
            }
        }
        Ok(delivered)
    }

    async fn expire_if_due(&self, id: Uuid) -> Result<PaymentSession, AppError> {
        let now = self.clock.now();
        let (session, expired) = mutate(&*self.sessions, id, now, |s: &mut PaymentSession| {
            Ok(s.expire_if_due(now))
        })
        .await?;
        if expired {
            info!(session_id = %id, status = PaymentStatus::Expired.as_str(), "payment session expired");
        }
        Ok(session)
    }

    async fn notify_switch(
        &self,
        id: Uuid,
    ) -> Result<(PaymentSession, DeliveryOutcome<PaymentStatus>), AppError> {
        let switch = self.switch.clone();
        let now = self.clock.now();
        deliver_pending(&*self.sessions, id, now, |s: PaymentSession| async move {
            let notification = BankNotification {
                transaction_id: s.switch_transaction_id,
                session_id: s.id,
                status: s.status.as_str().to_string(),
                stan: s.stan.clone(),
                bank_timestamp: now,
            };
            match switch.notify(&notification).await {
                // The switch will never accept this status for the transaction.
                Err(ClientError::Status(409, body)) => {
                    warn!(
                        session_id = %s.id,
                        transaction_id = %s.switch_transaction_id,
                        status = s.status.as_str(),
                        reply = %body,
                        "switch rejected notification as conflicting; not retrying"
                    );
                    Ok(())
                }
                other => other,
            }
        })
        .await
    }

    async fn notify_switch_quietly(&self, id: Uuid) -> Option<PaymentSession> {
        match self.notify_switch(id).await {
            Ok((session, _)) => Some(session),
            Err(e) => {
                warn!(session_id = %id, error = %e, "switch notification bookkeeping failed");
                None
            }
        }
    }
}
