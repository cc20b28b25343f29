//! Outbound HTTP clients for the cross-service hops.

pub mod bank;
pub mod merchant;
pub mod switch;

use reqwest::{Client, Response};
use std::time::Duration;
use thiserror::Error;

pub use bank::{BankClient, BankGateway};
pub use merchant::{MerchantCallbackClient, MerchantNotifier};
pub use switch::{SwitchClient, SwitchGateway, SwitchNotifier};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}: {1}")]
    Status(u16, String),
    #[error("Circuit breaker open: {0}")]
    CircuitOpen(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Builds a client whose every call is bounded by `timeout`.
pub fn build_http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .unwrap_or_default()
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turns any non-2xx response into `ClientError::Status`, keeping the body text.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Status(status.as_u16(), body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("http://bank.local/", "/api/bank/payments/init"),
            "http://bank.local/api/bank/payments/init"
        );
        assert_eq!(join_url("http://bank.local", "health"), "http://bank.local/health");
    }
}
