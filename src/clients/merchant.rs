use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{build_http_client, ensure_success, ClientError};
use crate::contracts::MerchantCallback;

/// Switch → Merchant outcome delivery to one of the merchant's callback URLs.
#[async_trait]
pub trait MerchantNotifier: Send + Sync {
    async fn deliver(&self, url: &str, callback: &MerchantCallback) -> Result<(), ClientError>;
}

#[derive(Clone)]
pub struct MerchantCallbackClient {
    client: Client,
}

impl MerchantCallbackClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: build_http_client(timeout),
        }
    }
}

#[async_trait]
impl MerchantNotifier for MerchantCallbackClient {
    async fn deliver(&self, url: &str, callback: &MerchantCallback) -> Result<(), ClientError> {
        let response = self.client.post(url).json(callback).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}
