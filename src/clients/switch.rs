use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{build_http_client, ensure_success, join_url, ClientError};
use crate::contracts::{BankNotification, SwitchInitRequest, SwitchInitResponse};

/// Bank → Switch status delivery.
#[async_trait]
pub trait SwitchNotifier: Send + Sync {
    async fn notify(&self, notification: &BankNotification) -> Result<(), ClientError>;
}

/// Merchant → Switch transaction initiation.
#[async_trait]
pub trait SwitchGateway: Send + Sync {
    async fn init_transaction(
        &self,
        request: &SwitchInitRequest,
    ) -> Result<SwitchInitResponse, ClientError>;
}

#[derive(Clone)]
pub struct SwitchClient {
    client: Client,
    base_url: String,
}

impl SwitchClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self {
            client: build_http_client(timeout),
            base_url,
        }
    }
}

#[async_trait]
impl SwitchNotifier for SwitchClient {
    async fn notify(&self, notification: &BankNotification) -> Result<(), ClientError> {
        let url = join_url(&self.base_url, "/api/switch/bank/notify");
        let response = self.client.post(&url).json(notification).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl SwitchGateway for SwitchClient {
    async fn init_transaction(
        &self,
        request: &SwitchInitRequest,
    ) -> Result<SwitchInitResponse, ClientError> {
        let url = join_url(&self.base_url, "/api/switch/transactions/init");
        let response = self.client.post(&url).json(request).send().await?;
        let response = ensure_success(response).await?;
        response
            .json::<SwitchInitResponse>()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))
    }
}
