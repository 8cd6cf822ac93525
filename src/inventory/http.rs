use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{InventoryClient, InventoryClientError};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};

#[derive(Debug, Serialize)]
struct IncreaseStockRequest<'a> {
    quantity: u32,
    reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct IncreaseStockResponse {
    stock_level: i64,
}

/// Talks to the inventory service over HTTP:
/// `POST {base_url}/api/v1/inventory/{product_id}/increase`.
///
/// The increment reference travels both in the body and as the
/// `Idempotency-Key` header.
#[derive(Debug)]
pub struct HttpInventoryClient {
    client: reqwest::Client,
    base_url: String,
    breaker: CircuitBreaker,
}

impl HttpInventoryClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        breaker: CircuitBreakerConfig,
    ) -> Result<Self, InventoryClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| InventoryClientError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            breaker: CircuitBreaker::new("inventory", breaker),
        })
    }

    async fn post_increase(
        &self,
        product_id: Uuid,
        quantity: u32,
        reference: &str,
    ) -> Result<i64, InventoryClientError> {
        let url = format!("{}/api/v1/inventory/{}/increase", self.base_url, product_id);
        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", reference)
            .json(&IncreaseStockRequest {
                quantity,
                reference,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InventoryClientError::Timeout
                } else {
                    InventoryClientError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let body: IncreaseStockResponse = response
                .json()
                .await
                .map_err(|e| InventoryClientError::Unavailable(e.to_string()))?;
            return Ok(body.stock_level);
        }

        let detail = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(InventoryClientError::UnknownProduct(product_id)),
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
                Err(InventoryClientError::Timeout)
            }
            s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => Err(
                InventoryClientError::Unavailable(format!("{}: {}", status, detail)),
            ),
            _ => Err(InventoryClientError::Rejected(format!("{}: {}", status, detail))),
        }
    }
}

#[async_trait]
impl InventoryClient for HttpInventoryClient {
    #[instrument(skip(self))]
    async fn increase_stock(
        &self,
        product_id: Uuid,
        quantity: u32,
        reference: &str,
    ) -> Result<i64, InventoryClientError> {
        let result = self
            .breaker
            .call(InventoryClientError::is_transient, || {
                self.post_increase(product_id, quantity, reference)
            })
            .await;
        match result {
            Ok(level) => {
                debug!(level, "Stock increased");
                Ok(level)
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                warn!("Inventory circuit open, skipping call");
                Err(InventoryClientError::Unavailable(
                    "circuit breaker open".to_string(),
                ))
            }
            Err(CircuitBreakerError::Inner(err)) => Err(err),
        }
    }
}
