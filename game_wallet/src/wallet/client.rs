//! HTTP client for the external wallet API.

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{
    WalletGateway,
    config::WalletConfig,
    errors::{GatewayError, GatewayResult},
    models::{Balance, ErrorResponse, OperationRequest, OperationResponse, WalletOperation},
};
use crate::ledger::PlayerId;

/// `WalletGateway` speaking the wallet's JSON-over-HTTP API
#[derive(Clone)]
pub struct HttpWalletGateway {
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpWalletGateway {
    /// Create a new gateway client
    ///
    /// # Errors
    ///
    /// * `GatewayError::Network` - The HTTP client could not be built
    pub fn new(config: &WalletConfig) -> GatewayResult<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            timeout,
            client,
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> GatewayResult<T> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status.is_success() {
            // The call went through; a retry could apply it twice
            return response
                .json::<T>()
                .await
                .map_err(|e| GatewayError::UnreadableSuccess {
                    status: status.as_u16(),
                    detail: e.to_string(),
                });
        }

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::Unavailable {
                status: status.as_u16(),
            });
        }

        match response.json::<ErrorResponse>().await {
            Ok(body) => Err(GatewayError::Rejected {
                code: body.code,
                message: body.msg,
            }),
            Err(e) => Err(GatewayError::Decode(format!(
                "HTTP {} with unreadable error body: {e}",
                status.as_u16()
            ))),
        }
    }

    fn classify(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.timeout)
        } else {
            GatewayError::from(err)
        }
    }

    async fn post_operation(&self, path: &str, op: &WalletOperation) -> GatewayResult<Decimal> {
        let request = self
            .client
            .post(format!("{}{path}", self.base_url))
            .json(&OperationRequest::from(op));

        let response: OperationResponse = self.send(request).await?;
        Ok(response.balance)
    }
}

#[async_trait]
impl WalletGateway for HttpWalletGateway {
    async fn get_balance(&self, player_id: PlayerId) -> GatewayResult<Balance> {
        let request = self
            .client
            .get(format!("{}/api/v1/balance/{player_id}", self.base_url));
        self.send(request).await
    }

    async fn debit(&self, op: &WalletOperation) -> GatewayResult<Decimal> {
        self.post_operation("/api/v1/withdraw", op).await
    }

    async fn credit(&self, op: &WalletOperation) -> GatewayResult<Decimal> {
        self.post_operation("/api/v1/deposit", op).await
    }
}
