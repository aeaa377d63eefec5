//! Trading REST Client Integration Tests
//!
//! Exercises `HttpTradingApi` against a wiremock backend: request shapes,
//! authentication, and error mapping.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use trade_feed::domain::account::{TradeOrder, TradeStatus};
use trade_feed::{ApiError, HttpConfig, HttpTradingApi, OrderId, Side, TradingApi, UserId};

fn client(server: &MockServer) -> HttpTradingApi {
    let mut config = HttpConfig::new(server.uri());
    config.token = Some("secret-token".to_string());
    HttpTradingApi::new(&config).unwrap()
}

fn order() -> TradeOrder {
    TradeOrder::new(
        UserId::new(1),
        "AAPL",
        Side::Buy,
        Decimal::from_str("150.5").unwrap(),
        10,
    )
}

#[tokio::test]
async fn fetches_portfolio_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/portfolio/1"))
        .and(header("authorization", "Bearer secret-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "username": "trader1",
            "balance": 10000.0,
            "holdings": [
                {"ticker": "AAPL", "quantity": 10, "avgPrice": 150.0, "currentPrice": 155.0}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let portfolio = client(&server).portfolio(UserId::new(1)).await.unwrap();

    assert_eq!(portfolio.username, "trader1");
    assert_eq!(portfolio.holdings.len(), 1);
    assert_eq!(portfolio.total_value(), Decimal::from(11550));
}

#[tokio::test]
async fn fetches_pending_orders_and_history() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/pending/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 3, "ticker": "TSLA", "price": 250.0, "quantity": 5, "type": "SELL", "status": "PENDING"}
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/orders/history/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 11, "ticker": "AAPL", "price": 178.5, "quantity": 2, "buyerId": 7, "sellerId": 8,
             "timestamp": "2024-01-15T14:30:00"}
        ])))
        .mount(&server)
        .await;

    let api = client(&server);
    let pending = api.pending_orders(UserId::new(7)).await.unwrap();
    let history = api.history(UserId::new(7)).await.unwrap();

    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, OrderId::new(3));
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].side_for(UserId::new(7)), Some(Side::Buy));
}

#[tokio::test]
async fn posts_order_and_parses_json_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trade"))
        .and(body_json(json!({
            "ticker": "AAPL",
            "price": 150.5,
            "quantity": 10,
            "type": "BUY",
            "userId": 1
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 42,
            "ticker": "AAPL",
            "price": 150.5,
            "quantity": 10,
            "type": "BUY",
            "timestamp": "2024-01-15T14:30:00Z",
            "status": "EXECUTED"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client(&server).place_order(&order()).await.unwrap();

    assert_eq!(response.id.as_deref(), Some("42"));
    assert_eq!(response.status, TradeStatus::Executed);
    assert!(response.timestamp.is_some());
}

#[tokio::test]
async fn plain_text_acknowledgement_is_queued() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/trade"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Order placed"))
        .mount(&server)
        .await;

    let response = client(&server).place_order(&order()).await.unwrap();

    assert_eq!(response.id, None);
    assert_eq!(response.status, TradeStatus::Pending);
    assert_eq!(response.ticker, "AAPL");
    assert_eq!(response.quantity, 10);
}

#[tokio::test]
async fn cancels_order() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/orders/42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client(&server).cancel_order(OrderId::new(42)).await.unwrap();
}

#[tokio::test]
async fn unauthorized_is_mapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let err = client(&server).portfolio(UserId::new(1)).await.unwrap_err();
    assert_eq!(err, ApiError::Unauthorized);
}

#[tokio::test]
async fn server_error_keeps_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(500).set_body_string("order already filled\n"))
        .mount(&server)
        .await;

    let err = client(&server)
        .cancel_order(OrderId::new(9))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ApiError::Status {
            status: 500,
            body: "order already filled".to_string(),
        }
    );
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/orders/pending/1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"not\": \"a list\"}"))
        .mount(&server)
        .await;

    let err = client(&server)
        .pending_orders(UserId::new(1))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }));
}

#[tokio::test]
async fn slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let mut config = HttpConfig::new(server.uri());
    config.timeout = Duration::from_millis(50);
    let api = HttpTradingApi::new(&config).unwrap();

    let err = api.portfolio(UserId::new(1)).await.unwrap_err();
    assert_eq!(err, ApiError::Timeout);
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
    let api = HttpTradingApi::new(&HttpConfig::new("http://127.0.0.1:1")).unwrap();

    let err = api.history(UserId::new(1)).await.unwrap_err();
    assert!(matches!(err, ApiError::Network { .. }));
}
