//! Portfolio View
//!
//! Keeps one user's portfolio fresh: loaded on mount, re-fetched whenever a
//! trade is pushed.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::watch;

use super::refresh::{ConsumerProbe, ConsumerState, Fetcher, RefreshCoordinator, RefreshStatus};
use crate::application::ports::TradingApi;
use crate::domain::account::{Portfolio, UserId};
use crate::domain::subscription::{SubscriptionRegistry, Unsubscribe};
use crate::domain::trade::TRADES_TOPIC;

/// Live portfolio of one user.
#[derive(Debug)]
pub struct PortfolioView {
    user: UserId,
    coordinator: RefreshCoordinator<Portfolio>,
    subscription: Unsubscribe,
}

impl PortfolioView {
    /// Start loading and subscribe to the trades topic.
    #[must_use]
    pub fn mount(
        api: Arc<dyn TradingApi>,
        registry: &Arc<SubscriptionRegistry>,
        user: UserId,
    ) -> Self {
        let fetcher: Fetcher<Portfolio> = Arc::new(move || {
            let api = Arc::clone(&api);
            async move { api.portfolio(user).await }.boxed()
        });

        let coordinator = RefreshCoordinator::new("portfolio", fetcher);
        coordinator.reload();

        let invalidate = coordinator.invalidator();
        let subscription = registry.subscribe(TRADES_TOPIC, move |_| invalidate());

        tracing::info!(user = %user, "Portfolio view mounted");
        Self {
            user,
            coordinator,
            subscription,
        }
    }

    /// User whose portfolio is shown.
    #[must_use]
    pub const fn user(&self) -> UserId {
        self.user
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConsumerState<Portfolio> {
        self.coordinator.snapshot()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConsumerState<Portfolio>> {
        self.coordinator.subscribe()
    }

    /// Manual retry.
    pub fn reload(&self) {
        self.coordinator.reload();
    }

    /// Unsubscribe and discard any in-flight result.
    pub fn unmount(&self) {
        self.subscription.unsubscribe();
        self.coordinator.teardown();
    }
}

impl ConsumerProbe for PortfolioView {
    fn status(&self) -> RefreshStatus {
        self.coordinator.status()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::*;
    use crate::application::ports::{ApiError, MockTradingApi};
    use crate::domain::trade::decode_trade;

    const WAIT: Duration = Duration::from_secs(2);

    fn portfolio(balance: i64) -> Portfolio {
        Portfolio {
            id: UserId::new(1),
            username: "trader1".to_string(),
            balance: Decimal::from(balance),
            holdings: Vec::new(),
        }
    }

    fn trade() -> crate::domain::trade::TradeEvent {
        decode_trade(
            r#"{"id":"1","ticker":"AAPL","price":178.52,"quantity":150,"type":"BUY","timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn loads_on_mount_and_refreshes_on_trade() {
        let mut api = MockTradingApi::new();
        let mut balances = vec![900, 1000].into_iter();
        api.expect_portfolio()
            .withf(|user| *user == UserId::new(1))
            .times(2)
            .returning(move |_| Ok(portfolio(balances.next().unwrap_or_default())));

        let registry = Arc::new(SubscriptionRegistry::detached());
        let view = PortfolioView::mount(Arc::new(api), &registry, UserId::new(1));
        let mut rx = view.subscribe();

        tokio::time::timeout(WAIT, rx.wait_for(|s| s.sequence == 1))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(registry.dispatch(TRADES_TOPIC, &trade()), 1);
        let state = tokio::time::timeout(WAIT, rx.wait_for(|s| s.sequence == 2))
            .await
            .unwrap()
            .unwrap()
            .clone();

        assert_eq!(state.data.map(|p| p.balance), Some(Decimal::from(1000)));
    }

    #[tokio::test]
    async fn failure_surfaces_and_reload_recovers() {
        let mut api = MockTradingApi::new();
        let mut calls = 0;
        api.expect_portfolio().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(ApiError::Network {
                    message: "connection refused".to_string(),
                })
            } else {
                Ok(portfolio(5))
            }
        });

        let registry = Arc::new(SubscriptionRegistry::detached());
        let view = PortfolioView::mount(Arc::new(api), &registry, UserId::new(1));
        let mut rx = view.subscribe();

        tokio::time::timeout(WAIT, rx.wait_for(|s| s.error.is_some()))
            .await
            .unwrap()
            .unwrap();
        assert!(view.status().error.is_some());

        view.reload();
        let state = tokio::time::timeout(WAIT, rx.wait_for(|s| s.data.is_some()))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert_eq!(state.error, None);
    }

    #[tokio::test]
    async fn unmount_unsubscribes() {
        let mut api = MockTradingApi::new();
        api.expect_portfolio().times(1).returning(|_| Ok(portfolio(1)));

        let registry = Arc::new(SubscriptionRegistry::detached());
        let view = PortfolioView::mount(Arc::new(api), &registry, UserId::new(1));
        let mut rx = view.subscribe();
        tokio::time::timeout(WAIT, rx.wait_for(|s| s.sequence == 1))
            .await
            .unwrap()
            .unwrap();
        view.unmount();

        assert!(!registry.is_active(TRADES_TOPIC));
        assert_eq!(registry.dispatch(TRADES_TOPIC, &trade()), 0);
    }
}
