//! The merchant: starts purchases at the switch and records the outcome the
//! switch reports back.

use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::InMemoryStore;
use crate::clients::{join_url, SwitchGateway};
use crate::clock::Clock;
use crate::contracts::{CallbackAck, MerchantCallback, PurchaseRequest, PurchaseResponse, SwitchInitRequest};
use crate::domain::status_map::status_for_callback;
use crate::domain::{CallbackKind, OrderRecord};
use crate::error::AppError;
use crate::ports::{mutate, Repository, RepositoryError};
use crate::validation::{
    normalize_currency, require, sanitize_string, validate_identifier, validate_positive_amount,
    ORDER_ID_MAX_LEN,
};

#[derive(Clone)]
pub struct MerchantSettings {
    pub merchant_id: String,
    pub merchant_secret: String,
    /// Base URL the switch uses to reach the callback sinks.
    pub public_base_url: String,
}

impl std::fmt::Debug for MerchantSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerchantSettings")
            .field("merchant_id", &self.merchant_id)
            .field("merchant_secret", &"***")
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

#[derive(Clone)]
pub struct MerchantService {
    orders: Arc<InMemoryStore<OrderRecord>>,
    switch: Arc<dyn SwitchGateway>,
    clock: Arc<dyn Clock>,
    settings: MerchantSettings,
}

impl MerchantService {
    pub fn new(
        orders: Arc<InMemoryStore<OrderRecord>>,
        switch: Arc<dyn SwitchGateway>,
        clock: Arc<dyn Clock>,
        settings: MerchantSettings,
    ) -> Self {
        Self {
            orders,
            switch,
            clock,
            settings,
        }
    }

    fn callback_url(&self, kind: CallbackKind) -> String {
        join_url(
            &self.settings.public_base_url,
            &format!("/payment/{}", kind.as_str()),
        )
    }

    pub async fn start_purchase(&self, req: PurchaseRequest) -> Result<PurchaseResponse, AppError> {
        let amount = require("amount", req.amount)?;
        validate_positive_amount(&amount)?;
        let currency = normalize_currency(&require("currency", req.currency)?)?;
        let order_id = sanitize_string(&require("order_id", req.order_id)?);
        validate_identifier("order_id", &order_id, ORDER_ID_MAX_LEN)?;

        let now = self.clock.now();
        let request = SwitchInitRequest {
            merchant_id: Some(self.settings.merchant_id.clone()),
            merchant_secret: Some(self.settings.merchant_secret.clone()),
            amount: Some(amount.clone()),
            currency: Some(currency.clone()),
            order_id: Some(order_id.clone()),
            timestamp: Some(now),
            success_url: Some(self.callback_url(CallbackKind::Success)),
            fail_url: Some(self.callback_url(CallbackKind::Fail)),
            error_url: Some(self.callback_url(CallbackKind::Error)),
        };

        let response = self.switch.init_transaction(&request).await?;
        let order = OrderRecord::placed(
            response.transaction_id,
            order_id,
            amount,
            currency,
            response.checkout_url.clone(),
            now,
        );
        self.orders.insert(&order).await?;

        info!(
            transaction_id = %response.transaction_id,
            order_id = %order.merchant_order_id,
            "purchase started"
        );

        Ok(PurchaseResponse {
            transaction_id: response.transaction_id,
            redirect_url: response.checkout_url,
        })
    }

    pub async fn get_order(&self, transaction_id: Uuid) -> Result<OrderRecord, AppError> {
        Ok(self.orders.get_by_id(transaction_id).await?)
    }

    /// Records the outcome delivered to one of the callback sinks.
    pub async fn record_callback(
        &self,
        kind: CallbackKind,
        callback: MerchantCallback,
    ) -> Result<CallbackAck, AppError> {
        let expected = status_for_callback(kind);
        if callback.status != expected {
            return Err(AppError::Validation(format!(
                "status: {} cannot be delivered to the {} callback",
                callback.status,
                kind.as_str()
            )));
        }

        let now = self.clock.now();
        if self.orders.get(callback.transaction_id).await.is_none() {
            warn!(transaction_id = %callback.transaction_id, "callback for an unknown order");
            let order = OrderRecord::unsolicited(
                callback.transaction_id,
                callback.merchant_order_id.clone(),
                now,
            );
            match self.orders.insert(&order).await {
                Ok(_) | Err(RepositoryError::Duplicate(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        let (_, newly_recorded) =
            mutate(&*self.orders, callback.transaction_id, now, |order: &mut OrderRecord| {
                order
                    .record_outcome(expected, callback.bank_payment_id, now)
                    .map_err(AppError::from)
            })
            .await?;

        info!(
            transaction_id = %callback.transaction_id,
            status = expected.as_str(),
            newly_recorded,
            "payment outcome received"
        );

        Ok(CallbackAck {
            transaction_id: callback.transaction_id,
            kind,
            status: expected,
            newly_recorded,
        })
    }
}
