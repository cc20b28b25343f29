use async_trait::async_trait;
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use std::time::Duration;

use super::{build_http_client, ensure_success, join_url, ClientError};
use crate::contracts::{BankInitRequest, BankInitResponse};

/// Switch → Bank session initiation.
#[async_trait]
pub trait BankGateway: Send + Sync {
    async fn init_session(&self, request: &BankInitRequest) -> Result<BankInitResponse, ClientError>;
}

/// HTTP client for the bank, guarded by a consecutive-failures circuit breaker.
#[derive(Clone)]
pub struct BankClient {
    client: Client,
    base_url: String,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl BankClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        Self::with_circuit_breaker(base_url, timeout, 3, 60)
    }

    pub fn with_circuit_breaker(
        base_url: String,
        timeout: Duration,
        failure_threshold: u32,
        reset_timeout_secs: u64,
    ) -> Self {
        let backoff = backoff::equal_jittered(
            Duration::from_secs(reset_timeout_secs),
            Duration::from_secs(reset_timeout_secs * 2),
        );
        let policy = failure_policy::consecutive_failures(failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        BankClient {
            client: build_http_client(timeout),
            base_url,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }
}

#[async_trait]
impl BankGateway for BankClient {
    async fn init_session(&self, request: &BankInitRequest) -> Result<BankInitResponse, ClientError> {
        let url = join_url(&self.base_url, "/api/bank/payments/init");
        let client = self.client.clone();
        let body = request.clone();

        let result = self
            .circuit_breaker
            .call(async move {
                let response = client.post(&url).json(&body).send().await?;
                let response = ensure_success(response).await?;
                response
                    .json::<BankInitResponse>()
                    .await
                    .map_err(|e| ClientError::InvalidResponse(e.to_string()))
            })
            .await;

        match result {
            Ok(session) => Ok(session),
            Err(FailsafeError::Rejected) => Err(ClientError::CircuitOpen(
                "bank circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}
