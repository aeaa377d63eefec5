//! Subscription Registry
//!
//! Tracks local listeners per topic and fans decoded trade events out to
//! them.
//!
//! # Design
//!
//! The registry deduplicates topics against the transport:
//! - The first listener on a topic opens it on the transport
//! - Further listeners only join the local fan-out
//! - The last listener leaving closes it on the transport
//!
//! Registrations are keyed by subscription token, so two registrations of the
//! same callback are distinct. Tokens are issued in increasing order, which
//! makes token order the registration order used for dispatch.
//!
//! The transport is told *which* topic changed, never what to do about it. It
//! reconciles against [`SubscriptionRegistry::is_active`], so changes made
//! while disconnected are applied at the next handshake.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::domain::trade::TradeEvent;

// =============================================================================
// Types
// =============================================================================

/// A named logical channel on the push transport, e.g. `trades`.
pub type Topic = String;

/// Opaque token identifying one registration.
pub type SubscriptionId = u64;

/// Callback receiving every event published on a topic.
pub type Listener = Arc<dyn Fn(TradeEvent) + Send + Sync>;

/// STOMP destination for a topic.
///
/// A bare topic maps to `/topic/<topic>`; anything already starting with `/`
/// is used verbatim.
#[must_use]
pub fn destination_for(topic: &str) -> String {
    if topic.starts_with('/') {
        topic.to_string()
    } else {
        format!("/topic/{topic}")
    }
}

/// Receives notice when a topic gains its first or loses its last listener.
pub trait TopicTransport: Send + Sync {
    /// A topic gained its first listener.
    fn topic_opened(&self, topic: &str);

    /// A topic lost its last listener.
    fn topic_closed(&self, topic: &str);
}

/// Transport that ignores topic changes. Used for standalone registries.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedTransport;

impl TopicTransport for DetachedTransport {
    fn topic_opened(&self, _topic: &str) {}

    fn topic_closed(&self, _topic: &str) {}
}

// =============================================================================
// Unsubscribe Handle
// =============================================================================

/// Handle returned by every subscribe-style call.
///
/// Calling [`Unsubscribe::unsubscribe`] more than once is harmless. Dropping
/// the handle unsubscribes as well; use [`Unsubscribe::forget`] to keep the
/// registration for the lifetime of its owner.
#[must_use = "dropping the handle unsubscribes immediately"]
pub struct Unsubscribe {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Unsubscribe {
    /// Wrap a teardown action.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// Handle with nothing to tear down.
    pub fn noop() -> Self {
        Self {
            action: Mutex::new(None),
        }
    }

    /// Remove the registration. Idempotent.
    pub fn unsubscribe(&self) {
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    /// Whether the registration is still in place.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.action.lock().is_some()
    }

    /// Keep the registration alive without holding the handle.
    pub fn forget(self) {
        self.action.lock().take();
    }
}

impl Drop for Unsubscribe {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Registry statistics for the status endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionStats {
    /// Topics with at least one listener.
    pub active_topics: usize,
    /// Listener count per topic.
    pub listeners: BTreeMap<Topic, usize>,
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Default)]
struct RegistryState {
    topics: HashMap<Topic, BTreeMap<SubscriptionId, Listener>>,
    owners: HashMap<SubscriptionId, Topic>,
    next_id: SubscriptionId,
}

/// Local fan-out of pushed events with deduplicated transport topics.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use trade_feed::domain::subscription::SubscriptionRegistry;
/// use trade_feed::domain::trade::decode_trade;
///
/// let registry = Arc::new(SubscriptionRegistry::detached());
/// let seen = Arc::new(AtomicUsize::new(0));
///
/// let counter = Arc::clone(&seen);
/// let handle = registry.subscribe("trades", move |_| {
///     counter.fetch_add(1, Ordering::SeqCst);
/// });
///
/// let event = decode_trade(
///     r#"{"id":"1","ticker":"AAPL","price":178.52,"quantity":150,"type":"BUY","timestamp":"2024-01-01T00:00:00Z"}"#,
/// )
/// .unwrap();
/// registry.dispatch("trades", &event);
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
///
/// handle.unsubscribe();
/// registry.dispatch("trades", &event);
/// assert_eq!(seen.load(Ordering::SeqCst), 1);
/// ```
pub struct SubscriptionRegistry {
    state: RwLock<RegistryState>,
    transport: Arc<dyn TopicTransport>,
}

impl SubscriptionRegistry {
    /// Create a registry reporting topic changes to `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn TopicTransport>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            transport,
        }
    }

    /// Create a registry with no transport behind it.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(Arc::new(DetachedTransport))
    }

    /// Register `listener` on `topic`.
    ///
    /// The first listener on a topic opens it on the transport.
    pub fn subscribe<F>(self: &Arc<Self>, topic: impl Into<Topic>, listener: F) -> Unsubscribe
    where
        F: Fn(TradeEvent) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let (id, first) = {
            let mut state = self.state.write();
            let id = state.next_id;
            state.next_id += 1;

            let listeners = state.topics.entry(topic.clone()).or_default();
            let first = listeners.is_empty();
            listeners.insert(id, Arc::new(listener));
            state.owners.insert(id, topic.clone());
            (id, first)
        };

        tracing::debug!(topic = %topic, subscription_id = id, first, "Listener registered");
        if first {
            self.transport.topic_opened(&topic);
        }

        let registry: Weak<Self> = Arc::downgrade(self);
        Unsubscribe::new(move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(id);
            }
        })
    }

    fn remove(&self, id: SubscriptionId) {
        let closed = {
            let mut state = self.state.write();
            let Some(topic) = state.owners.remove(&id) else {
                return;
            };

            let now_empty = state.topics.get_mut(&topic).is_some_and(|listeners| {
                listeners.remove(&id);
                listeners.is_empty()
            });
            if now_empty {
                state.topics.remove(&topic);
            }
            tracing::debug!(topic = %topic, subscription_id = id, last = now_empty, "Listener removed");
            now_empty.then_some(topic)
        };

        if let Some(topic) = closed {
            self.transport.topic_closed(&topic);
        }
    }

    /// Deliver `event` to every listener of `topic` in registration order.
    ///
    /// Listeners run outside the registry lock and may subscribe or
    /// unsubscribe from inside the callback. A listener removed by an earlier
    /// listener in the same dispatch is skipped. Returns the number of
    /// listeners invoked.
    pub fn dispatch(&self, topic: &str, event: &TradeEvent) -> usize {
        let snapshot: Vec<(SubscriptionId, Listener)> = {
            let state = self.state.read();
            match state.topics.get(topic) {
                Some(listeners) => listeners
                    .iter()
                    .map(|(id, listener)| (*id, Arc::clone(listener)))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (id, listener) in snapshot {
            if !self.state.read().owners.contains_key(&id) {
                continue;
            }
            listener(event.clone());
            delivered += 1;
        }
        delivered
    }

    /// Whether `topic` currently has at least one listener.
    #[must_use]
    pub fn is_active(&self, topic: &str) -> bool {
        self.state.read().topics.contains_key(topic)
    }

    /// Topics with at least one listener, sorted.
    #[must_use]
    pub fn active_topics(&self) -> Vec<Topic> {
        let mut topics: Vec<Topic> = self.state.read().topics.keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Find the registered topic whose destination is `destination`.
    #[must_use]
    pub fn topic_for_destination(&self, destination: &str) -> Option<Topic> {
        self.state
            .read()
            .topics
            .keys()
            .find(|topic| destination_for(topic) == destination)
            .cloned()
    }

    /// Number of listeners on `topic`.
    #[must_use]
    pub fn listener_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .topics
            .get(topic)
            .map_or(0, BTreeMap::len)
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        let state = self.state.read();
        SubscriptionStats {
            active_topics: state.topics.len(),
            listeners: state
                .topics
                .iter()
                .map(|(topic, listeners)| (topic.clone(), listeners.len()))
                .collect(),
        }
    }
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
