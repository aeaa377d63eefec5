//! Orders View and Order Entry
//!
//! `OrdersView` keeps pending orders and trade history fresh as one
//! [`OrderBook`]; both lists are fetched concurrently and applied together.
//! `OrderEntry` submits new orders.

use std::sync::Arc;

use futures::FutureExt;
use rust_decimal::Decimal;
use tokio::sync::watch;

use super::refresh::{ConsumerProbe, ConsumerState, Fetcher, RefreshCoordinator, RefreshStatus};
use crate::application::ports::{ApiError, TradingApi};
use crate::domain::account::{OrderBook, OrderId, TradeOrder, TradeResponse, UserId};
use crate::domain::subscription::{SubscriptionRegistry, Unsubscribe};
use crate::domain::trade::{Side, TRADES_TOPIC};

// =============================================================================
// Orders View
// =============================================================================

/// Live pending orders and trade history of one user.
pub struct OrdersView {
    user: UserId,
    api: Arc<dyn TradingApi>,
    coordinator: RefreshCoordinator<OrderBook>,
    subscription: Unsubscribe,
}

impl OrdersView {
    /// Start loading and subscribe to the trades topic.
    #[must_use]
    pub fn mount(
        api: Arc<dyn TradingApi>,
        registry: &Arc<SubscriptionRegistry>,
        user: UserId,
    ) -> Self {
        let source = Arc::clone(&api);
        let fetcher: Fetcher<OrderBook> = Arc::new(move || {
            let api = Arc::clone(&source);
            async move {
                let (pending, history) =
                    tokio::try_join!(api.pending_orders(user), api.history(user))?;
                Ok::<_, ApiError>(OrderBook { pending, history })
            }
            .boxed()
        });

        let coordinator = RefreshCoordinator::new("orders", fetcher);
        coordinator.reload();

        let invalidate = coordinator.invalidator();
        let subscription = registry.subscribe(TRADES_TOPIC, move |_| invalidate());

        tracing::info!(user = %user, "Orders view mounted");
        Self {
            user,
            api,
            coordinator,
            subscription,
        }
    }

    /// User whose orders are shown.
    #[must_use]
    pub const fn user(&self) -> UserId {
        self.user
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConsumerState<OrderBook> {
        self.coordinator.snapshot()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConsumerState<OrderBook>> {
        self.coordinator.subscribe()
    }

    /// Manual retry.
    pub fn reload(&self) {
        self.coordinator.reload();
    }

    /// Cancel a pending order, then reload.
    ///
    /// # Errors
    ///
    /// Returns the API error when the cancellation fails; nothing is
    /// reloaded in that case.
    pub async fn cancel_order(&self, order: OrderId) -> Result<(), ApiError> {
        self.api.cancel_order(order).await?;
        tracing::info!(user = %self.user, order = %order, "Order cancelled");
        self.coordinator.reload();
        Ok(())
    }

    /// Unsubscribe and discard any in-flight result.
    pub fn unmount(&self) {
        self.subscription.unsubscribe();
        self.coordinator.teardown();
    }
}

impl std::fmt::Debug for OrdersView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrdersView")
            .field("user", &self.user)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl ConsumerProbe for OrdersView {
    fn status(&self) -> RefreshStatus {
        self.coordinator.status()
    }
}

// =============================================================================
// Order Entry
// =============================================================================

/// Submits orders on behalf of one user.
#[derive(Clone)]
pub struct OrderEntry {
    user: UserId,
    api: Arc<dyn TradingApi>,
}

impl OrderEntry {
    /// Create an order entry for `user`.
    #[must_use]
    pub fn new(api: Arc<dyn TradingApi>, user: UserId) -> Self {
        Self { user, api }
    }

    /// Validate and submit an order.
    ///
    /// The ticker is trimmed and upper-cased.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidRequest`] for an empty ticker or a
    /// non-positive price or quantity, or the API error from submission.
    pub async fn place_order(
        &self,
        ticker: &str,
        side: Side,
        price: Decimal,
        quantity: u64,
    ) -> Result<TradeResponse, ApiError> {
        let ticker = ticker.trim().to_uppercase();
        if ticker.is_empty() {
            return Err(invalid("ticker must not be empty"));
        }
        if price <= Decimal::ZERO {
            return Err(invalid("price must be positive"));
        }
        if quantity == 0 {
            return Err(invalid("quantity must be positive"));
        }

        let order = TradeOrder::new(self.user, ticker, side, price, quantity);
        let response = self.api.place_order(&order).await?;
        tracing::info!(
            user = %self.user,
            ticker = %order.ticker,
            side = %order.side,
            status = ?response.status,
            "Order placed"
        );
        Ok(response)
    }
}

impl std::fmt::Debug for OrderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderEntry")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

fn invalid(message: &str) -> ApiError {
    ApiError::InvalidRequest {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use mockall::Sequence;
    use mockall::predicate::eq;

    use super::*;
    use crate::application::ports::MockTradingApi;
    use crate::domain::account::{Order, Trade, TradeStatus};

    const WAIT: Duration = Duration::from_secs(2);

    fn pending(id: u64) -> Order {
        Order {
            id: OrderId::new(id),
            user_id: Some(UserId::new(1)),
            ticker: "AAPL".to_string(),
            price: Decimal::from(150),
            quantity: 10,
            side: Side::Buy,
            status: None,
        }
    }

    fn executed(id: u64) -> Trade {
        Trade {
            id,
            ticker: "AAPL".to_string(),
            price: Decimal::from(150),
            quantity: 10,
            buyer_id: Some(UserId::new(1)),
            seller_id: Some(UserId::new(2)),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn loads_pending_and_history_together() {
        let mut api = MockTradingApi::new();
        api.expect_pending_orders()
            .with(eq(UserId::new(1)))
            .times(1)
            .returning(|_| Ok(vec![pending(5)]));
        api.expect_history()
            .with(eq(UserId::new(1)))
            .times(1)
            .returning(|_| Ok(vec![executed(9)]));

        let registry = Arc::new(SubscriptionRegistry::detached());
        let view = OrdersView::mount(Arc::new(api), &registry, UserId::new(1));
        let mut rx = view.subscribe();

        let state = tokio::time::timeout(WAIT, rx.wait_for(|s| s.sequence == 1))
            .await
            .unwrap()
            .unwrap()
            .clone();
        let book = state.data.unwrap();
        assert_eq!(book.pending[0].id, OrderId::new(5));
        assert_eq!(book.history[0].side_for(UserId::new(1)), Some(Side::Buy));
    }

    #[tokio::test]
    async fn refreshes_both_lists_on_trade() {
        let mut api = MockTradingApi::new();
        let mut pending_rounds = vec![vec![pending(5)], Vec::new()].into_iter();
        api.expect_pending_orders()
            .times(2)
            .returning(move |_| Ok(pending_rounds.next().unwrap_or_default()));
        let mut history_rounds = vec![Vec::new(), vec![executed(9)]].into_iter();
        api.expect_history()
            .times(2)
            .returning(move |_| Ok(history_rounds.next().unwrap_or_default()));

        let registry = Arc::new(SubscriptionRegistry::detached());
        let view = OrdersView::mount(Arc::new(api), &registry, UserId::new(1));
        let mut rx = view.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(|s| s.sequence == 1))
            .await
            .unwrap()
            .unwrap();

        let trade = crate::domain::trade::decode_trade(
            r#"{"id":"1","ticker":"AAPL","price":150,"quantity":10,"type":"BUY","timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(registry.dispatch(TRADES_TOPIC, &trade), 1);

        let state = tokio::time::timeout(WAIT, rx.wait_for(|s| s.sequence == 2 && !s.loading))
            .await
            .unwrap()
            .unwrap()
            .clone();
        let book = state.data.unwrap();
        assert!(book.pending.is_empty());
        assert_eq!(book.history[0].id, 9);
    }

    #[tokio::test]
    async fn one_failing_list_fails_the_whole_fetch() {
        let mut api = MockTradingApi::new();
        api.expect_pending_orders().returning(|_| Ok(vec![pending(5)]));
        api.expect_history().returning(|_| Err(ApiError::Unauthorized));

        let registry = Arc::new(SubscriptionRegistry::detached());
        let view = OrdersView::mount(Arc::new(api), &registry, UserId::new(1));
        let mut rx = view.subscribe();

        let state = tokio::time::timeout(WAIT, rx.wait_for(|s| s.sequence == 1))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(state.data, None);
        assert_eq!(state.error.as_deref(), Some("unauthorized"));
    }

    #[tokio::test]
    async fn cancel_then_reload() {
        let mut api = MockTradingApi::new();
        let mut seq = Sequence::new();
        api.expect_pending_orders()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(vec![pending(5)]));
        api.expect_cancel_order()
            .with(eq(OrderId::new(5)))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        api.expect_pending_orders()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Vec::new()));
        api.expect_history().times(2).returning(|_| Ok(Vec::new()));

        let registry = Arc::new(SubscriptionRegistry::detached());
        let view = OrdersView::mount(Arc::new(api), &registry, UserId::new(1));
        let mut rx = view.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(|s| s.sequence == 1))
            .await
            .unwrap()
            .unwrap();

        view.cancel_order(OrderId::new(5)).await.unwrap();
        let state = tokio::time::timeout(WAIT, rx.wait_for(|s| s.sequence == 2))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert!(state.data.unwrap().pending.is_empty());
    }

    #[tokio::test]
    async fn failed_cancel_does_not_reload() {
        let mut api = MockTradingApi::new();
        api.expect_pending_orders().times(1).returning(|_| Ok(Vec::new()));
        api.expect_history().times(1).returning(|_| Ok(Vec::new()));
        api.expect_cancel_order().returning(|_| {
            Err(ApiError::Status {
                status: 404,
                body: "not found".to_string(),
            })
        });

        let registry = Arc::new(SubscriptionRegistry::detached());
        let view = OrdersView::mount(Arc::new(api), &registry, UserId::new(1));
        let mut rx = view.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(|s| s.sequence == 1))
            .await
            .unwrap()
            .unwrap();

        let err = view.cancel_order(OrderId::new(1)).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 404, .. }));
        assert!(!view.status().loading);
    }

    #[tokio::test]
    async fn place_order_normalizes_and_submits() {
        let mut api = MockTradingApi::new();
        api.expect_place_order()
            .withf(|order| {
                order.ticker == "AAPL"
                    && order.user_id == UserId::new(1)
                    && order.side == Side::Sell
                    && order.quantity == 3
            })
            .times(1)
            .returning(|order| Ok(TradeResponse::queued(order)));

        let entry = OrderEntry::new(Arc::new(api), UserId::new(1));
        let response = entry
            .place_order(" aapl ", Side::Sell, Decimal::from_str("150.5").unwrap(), 3)
            .await
            .unwrap();
        assert_eq!(response.status, TradeStatus::Pending);
    }

    #[tokio::test]
    async fn place_order_rejects_invalid_input_locally() {
        let api = MockTradingApi::new();
        let entry = OrderEntry::new(Arc::new(api), UserId::new(1));

        for (ticker, price, quantity) in [
            ("", Decimal::ONE, 1),
            ("AAPL", Decimal::ZERO, 1),
            ("AAPL", Decimal::ONE, 0),
        ] {
            let err = entry
                .place_order(ticker, Side::Buy, price, quantity)
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::InvalidRequest { .. }));
        }
    }
}
