//! Trading REST Client
//!
//! [`TradingApi`] over HTTP with `reqwest`. One request per call, no retries:
//! failures go back to the consumer, which lets the user retry.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;

use crate::application::ports::{ApiError, TradingApi};
use crate::domain::account::{Order, OrderId, Portfolio, Trade, TradeOrder, TradeResponse, UserId};

/// Longest error body kept in [`ApiError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// REST client settings.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Backend base URL, without trailing slash.
    pub base_url: String,
    /// Bearer token sent on every request.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl HttpConfig {
    /// Defaults for `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP implementation of [`TradingApi`].
#[derive(Debug, Clone)]
pub struct HttpTradingApi {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTradingApi {
    /// Build a client.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRequest`] if the base URL is empty or the
    /// underlying client cannot be built.
    pub fn new(config: &HttpConfig) -> Result<Self, ApiError> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ApiError::InvalidRequest {
                message: "base URL must not be empty".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::InvalidRequest {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
        })
    }

    /// Base URL requests are made against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send and return the body of a 2xx response.
    async fn execute(&self, request: RequestBuilder) -> Result<String, ApiError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;
        if status.is_success() {
            return Ok(body);
        }

        tracing::warn!(status = status.as_u16(), "Trading API request failed");
        Err(status_error(status, &body))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        tracing::debug!(path, "GET");
        let body = self.execute(self.client.get(self.url(path))).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl TradingApi for HttpTradingApi {
    async fn portfolio(&self, user: UserId) -> Result<Portfolio, ApiError> {
        self.get_json(&format!("/api/portfolio/{user}")).await
    }

    async fn pending_orders(&self, user: UserId) -> Result<Vec<Order>, ApiError> {
        self.get_json(&format!("/api/orders/pending/{user}")).await
    }

    async fn history(&self, user: UserId) -> Result<Vec<Trade>, ApiError> {
        self.get_json(&format!("/api/orders/history/{user}")).await
    }

    async fn place_order(&self, order: &TradeOrder) -> Result<TradeResponse, ApiError> {
        tracing::debug!(ticker = %order.ticker, side = %order.side, "POST /trade");
        let body = self
            .execute(self.client.post(self.url("/trade")).json(order))
            .await?;

        // The backend may acknowledge with plain text instead of a JSON object.
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value @ serde_json::Value::Object(_)) => {
                serde_json::from_value(value).map_err(|e| ApiError::Decode {
                    message: e.to_string(),
                })
            }
            _ => {
                tracing::debug!(body = %body.trim(), "Order acknowledged without details");
                Ok(TradeResponse::queued(order))
            }
        }
    }

    async fn cancel_order(&self, order: OrderId) -> Result<(), ApiError> {
        tracing::debug!(order = %order, "DELETE order");
        self.execute(self.client.delete(self.url(&format!("/api/orders/{order}"))))
            .await?;
        Ok(())
    }
}

fn transport_error(error: reqwest::Error) -> ApiError {
    if error.is_timeout() {
        ApiError::Timeout
    } else {
        ApiError::Network {
            message: error.to_string(),
        }
    }
}

fn status_error(status: StatusCode, body: &str) -> ApiError {
    if status == StatusCode::UNAUTHORIZED {
        return ApiError::Unauthorized;
    }
    ApiError::Status {
        status: status.as_u16(),
        body: truncate(body.trim(), MAX_ERROR_BODY),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let api = HttpTradingApi::new(&HttpConfig::new("http://localhost:8080/")).unwrap();
        assert_eq!(api.base_url(), "http://localhost:8080");
        assert_eq!(api.url("/trade"), "http://localhost:8080/trade");
    }

    #[test]
    fn empty_base_url_is_rejected() {
        let err = HttpTradingApi::new(&HttpConfig::new("/")).unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest { .. }));
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, "nope"),
            ApiError::Unauthorized
        );
        assert_eq!(
            status_error(StatusCode::NOT_FOUND, " missing \n"),
            ApiError::Status {
                status: 404,
                body: "missing".to_string(),
            }
        );
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let body = "x".repeat(MAX_ERROR_BODY + 10);
        let ApiError::Status { body, .. } = status_error(StatusCode::BAD_GATEWAY, &body) else {
            panic!("expected a status error");
        };
        assert_eq!(body.len(), MAX_ERROR_BODY + 3);
        assert!(body.ends_with("..."));
    }
}
