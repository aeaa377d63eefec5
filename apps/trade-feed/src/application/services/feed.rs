//! Trade Feed
//!
//! The feed buffer bound to the trades topic. Every dispatched event is
//! pushed synchronously, so the buffer order is the transport receipt order.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::feed::FeedBuffer;
use crate::domain::subscription::{SubscriptionRegistry, Unsubscribe};
use crate::domain::trade::{TRADES_TOPIC, TradeEvent};
use crate::infrastructure::metrics;

/// Live, bounded, newest-first view of pushed trades.
#[derive(Debug)]
pub struct TradeFeed {
    buffer: Arc<RwLock<FeedBuffer>>,
    subscription: Unsubscribe,
}

impl TradeFeed {
    /// Subscribe a new buffer of `capacity` events to the trades topic.
    #[must_use]
    pub fn attach(registry: &Arc<SubscriptionRegistry>, capacity: usize) -> Self {
        let buffer = Arc::new(RwLock::new(FeedBuffer::new(capacity)));

        let sink = Arc::clone(&buffer);
        let subscription = registry.subscribe(TRADES_TOPIC, move |event| {
            let len = {
                let mut buffer = sink.write();
                buffer.push(event);
                buffer.len()
            };
            metrics::set_feed_size(len);
        });

        Self {
            buffer,
            subscription,
        }
    }

    /// Copy of the buffer, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TradeEvent> {
        self.buffer.read().snapshot()
    }

    /// Newest event, if any.
    #[must_use]
    pub fn latest(&self) -> Option<TradeEvent> {
        self.buffer.read().latest().cloned()
    }

    /// Number of events held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    /// Whether nothing was received yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.read().is_empty()
    }

    /// Maximum number of events held.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.read().capacity()
    }

    /// Stop receiving events. The buffer keeps what it has.
    pub fn detach(&self) {
        self.subscription.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::decode_trade;

    fn frame(id: u32) -> String {
        format!(
            r#"{{"id":"{id}","ticker":"AAPL","price":178.52,"quantity":150,"type":"BUY","timestamp":"2024-01-01T00:00:00Z"}}"#
        )
    }

    #[test]
    fn decode_fault_only_drops_its_own_frame() {
        let registry = Arc::new(SubscriptionRegistry::detached());
        let feed = TradeFeed::attach(&registry, 100);

        let frames = [frame(1), "{\"id\":\"2\"".to_string(), frame(3)];
        for body in &frames {
            if let Ok(event) = decode_trade(body) {
                registry.dispatch(TRADES_TOPIC, &event);
            }
        }

        let ids: Vec<String> = feed.snapshot().iter().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, vec!["3", "1"]);
        assert_eq!(feed.len(), 2);
    }

    #[test]
    fn reference_frame_lands_at_index_zero() {
        let registry = Arc::new(SubscriptionRegistry::detached());
        let feed = TradeFeed::attach(&registry, 100);

        for id in 0..150 {
            registry.dispatch(TRADES_TOPIC, &decode_trade(&frame(id)).unwrap());
        }
        let event = decode_trade(&frame(1000)).unwrap();
        registry.dispatch(TRADES_TOPIC, &event);

        assert_eq!(feed.len(), 100);
        assert_eq!(feed.latest(), Some(event));
        assert_eq!(feed.snapshot()[99].id(), "51");
    }

    #[test]
    fn detach_stops_updates() {
        let registry = Arc::new(SubscriptionRegistry::detached());
        let feed = TradeFeed::attach(&registry, 10);

        registry.dispatch(TRADES_TOPIC, &decode_trade(&frame(1)).unwrap());
        feed.detach();
        registry.dispatch(TRADES_TOPIC, &decode_trade(&frame(2)).unwrap());

        assert_eq!(feed.len(), 1);
        assert!(!registry.is_active(TRADES_TOPIC));
    }
}
