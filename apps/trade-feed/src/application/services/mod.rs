//! Application Services
//!
//! Consumers of the trades topic.
//!
//! - `RefreshCoordinator`: coalesced, sequence-guarded re-fetching
//! - `TradeFeed`: the feed buffer bound to the trades topic
//! - `PortfolioView`, `OrdersView`: refresh coordinators over the trading API
//! - `OrderEntry`: order submission

pub mod feed;
pub mod orders;
pub mod portfolio;
pub mod refresh;

pub use feed::TradeFeed;
pub use orders::{OrderEntry, OrdersView};
pub use portfolio::PortfolioView;
pub use refresh::{ConsumerProbe, ConsumerState, Fetcher, RefreshCoordinator, RefreshStatus};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::MockTradingApi;
    use crate::domain::account::{Portfolio, UserId};
    use crate::domain::subscription::SubscriptionRegistry;
    use crate::domain::trade::{TRADES_TOPIC, decode_trade};

    const WAIT: Duration = Duration::from_secs(2);

    const REFERENCE_FRAME: &str = r#"{"id":"1","ticker":"AAPL","price":178.52,"quantity":150,"type":"BUY","timestamp":"2024-01-01T00:00:00Z"}"#;

    #[tokio::test]
    async fn one_trade_reaches_feed_and_refreshes_each_view_once() {
        let portfolio_calls = Arc::new(AtomicUsize::new(0));
        let pending_calls = Arc::new(AtomicUsize::new(0));
        let history_calls = Arc::new(AtomicUsize::new(0));

        let mut api = MockTradingApi::new();
        let calls = Arc::clone(&portfolio_calls);
        api.expect_portfolio().times(2).returning(move |user| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Portfolio {
                id: user,
                username: "trader1".to_string(),
                balance: Decimal::from(10_000),
                holdings: Vec::new(),
            })
        });
        let calls = Arc::clone(&pending_calls);
        api.expect_pending_orders().times(2).returning(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        });
        let calls = Arc::clone(&history_calls);
        api.expect_history().times(2).returning(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        });
        let api: Arc<dyn crate::application::ports::TradingApi> = Arc::new(api);

        let registry = Arc::new(SubscriptionRegistry::detached());
        let feed = TradeFeed::attach(&registry, 100);
        let portfolio = PortfolioView::mount(Arc::clone(&api), &registry, UserId::new(1));
        let orders = OrdersView::mount(api, &registry, UserId::new(1));

        let mut portfolio_rx = portfolio.subscribe();
        let mut orders_rx = orders.subscribe();
        tokio::time::timeout(WAIT, portfolio_rx.wait_for(|s| s.sequence == 1 && !s.loading))
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(WAIT, orders_rx.wait_for(|s| s.sequence == 1 && !s.loading))
            .await
            .unwrap()
            .unwrap();

        let event = decode_trade(REFERENCE_FRAME).unwrap();
        assert_eq!(registry.dispatch(TRADES_TOPIC, &event), 3);
        assert_eq!(feed.snapshot()[0], event);

        tokio::time::timeout(WAIT, portfolio_rx.wait_for(|s| s.sequence == 2 && !s.loading))
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(WAIT, orders_rx.wait_for(|s| s.sequence == 2 && !s.loading))
            .await
            .unwrap()
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(portfolio_calls.load(Ordering::SeqCst), 2);
        assert_eq!(pending_calls.load(Ordering::SeqCst), 2);
        assert_eq!(history_calls.load(Ordering::SeqCst), 2);
        assert_eq!(portfolio.status().sequence, 2);
        assert_eq!(orders.status().sequence, 2);
        assert!(!portfolio.status().loading && !orders.status().loading);
        assert_eq!(feed.len(), 1);
    }
}
