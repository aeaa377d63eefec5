//! Feed Buffer
//!
//! Bounded, newest-first history of recent trade events. Not authoritative
//! and never persisted; it only mirrors what the push transport delivered.

use std::collections::VecDeque;

use crate::domain::trade::TradeEvent;

/// Default number of events kept.
pub const FEED_CAPACITY: usize = 100;

/// Newest-first ring of trade events.
///
/// `push` puts the event at index 0 and evicts the oldest event once the
/// buffer is full, so `len() <= capacity()` always holds.
#[derive(Debug, Clone)]
pub struct FeedBuffer {
    events: VecDeque<TradeEvent>,
    capacity: usize,
}

impl Default for FeedBuffer {
    fn default() -> Self {
        Self::new(FEED_CAPACITY)
    }
}

impl FeedBuffer {
    /// Create an empty buffer. A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert `event` as the newest entry, evicting the oldest on overflow.
    pub fn push(&mut self, event: TradeEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_back();
        }
        self.events.push_front(event);
    }

    /// Newest event, if any.
    #[must_use]
    pub fn latest(&self) -> Option<&TradeEvent> {
        self.events.front()
    }

    /// Copy of the buffer contents, newest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TradeEvent> {
        self.events.iter().cloned().collect()
    }

    /// Iterate newest first.
    pub fn iter(&self) -> impl Iterator<Item = &TradeEvent> {
        self.events.iter()
    }

    /// Number of events held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Maximum number of events held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::domain::trade::decode_trade;

    fn event(id: usize) -> TradeEvent {
        decode_trade(&format!(
            r#"{{"id":"{id}","ticker":"AAPL","price":178.52,"quantity":150,"type":"BUY","timestamp":"2024-01-01T00:00:00Z"}}"#
        ))
        .unwrap()
    }

    #[test]
    fn newest_first() {
        let mut feed = FeedBuffer::default();
        feed.push(event(1));
        feed.push(event(2));

        assert_eq!(feed.latest().map(TradeEvent::id), Some("2"));
        let ids: Vec<_> = feed.iter().map(TradeEvent::id).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[test]
    fn evicts_oldest_at_capacity() {
        let mut feed = FeedBuffer::default();
        for id in 1..=101 {
            feed.push(event(id));
        }

        assert_eq!(feed.len(), FEED_CAPACITY);
        assert_eq!(feed.latest().map(TradeEvent::id), Some("101"));
        assert_eq!(feed.snapshot().last().map(TradeEvent::id), Some("2"));
    }

    #[test]
    fn zero_capacity_keeps_one() {
        let mut feed = FeedBuffer::new(0);
        feed.push(event(1));
        feed.push(event(2));
        assert_eq!(feed.capacity(), 1);
        assert_eq!(feed.snapshot().len(), 1);
    }

    proptest! {
        #[test]
        fn holds_min_of_n_and_capacity_in_arrival_order(n in 0usize..260, capacity in 1usize..120) {
            let mut feed = FeedBuffer::new(capacity);
            for id in 0..n {
                feed.push(event(id));
            }

            prop_assert_eq!(feed.len(), n.min(capacity));
            let ids: Vec<usize> = feed
                .iter()
                .map(|e| e.id().parse().unwrap())
                .collect();
            let expected: Vec<usize> = (0..n).rev().take(capacity).collect();
            prop_assert_eq!(ids, expected);
        }
    }
}
