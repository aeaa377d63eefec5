//! Refresh Coordinator
//!
//! Treats every pushed event as "your view may be stale" and keeps one
//! consumer's authoritative state fresh with coalesced re-fetches.
//!
//! - Invalidation while idle starts a fetch
//! - Invalidation while a fetch is in flight owes exactly one trailing fetch
//! - Results older than the newest applied result are dropped
//! - Nothing is applied after teardown
//!
//! Failures are never retried here. They land in [`ConsumerState::error`]
//! next to the last good data, and the consumer calls
//! [`RefreshCoordinator::reload`] to try again.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Instant;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use crate::application::ports::ApiError;
use crate::domain::refresh::{RefreshTicket, Sequence};
use crate::infrastructure::metrics;

/// Produces one authoritative fetch per call.
pub type Fetcher<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

/// What a consumer currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerState<T> {
    /// Last successfully applied data.
    pub data: Option<T>,
    /// A fetch is in flight.
    pub loading: bool,
    /// Error from the newest applied fetch, if it failed.
    pub error: Option<String>,
    /// Sequence of the newest applied fetch (0 before the first).
    pub sequence: Sequence,
}

impl<T> Default for ConsumerState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            sequence: 0,
        }
    }
}

/// Loading and error flags of one consumer, without its data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshStatus {
    /// Consumer name.
    pub name: &'static str,
    /// A fetch is in flight.
    pub loading: bool,
    /// Last error, if the newest applied fetch failed.
    pub error: Option<String>,
    /// Sequence of the newest applied fetch.
    pub sequence: Sequence,
    /// Whether data has ever been loaded.
    pub has_data: bool,
}

/// Anything that can report a [`RefreshStatus`].
pub trait ConsumerProbe: Send + Sync {
    /// Current flags.
    fn status(&self) -> RefreshStatus;
}

struct Shared<T> {
    name: &'static str,
    ticket: Mutex<RefreshTicket>,
    state: watch::Sender<ConsumerState<T>>,
    fetcher: Fetcher<T>,
}

impl<T: Send + Sync + 'static> Shared<T> {
    fn invalidate(self: &Arc<Self>) {
        let sequence = self.ticket.lock().invalidate();
        match sequence {
            Some(sequence) => self.start(sequence),
            None if !self.ticket.lock().is_closed() => {
                metrics::record_fetch_coalesced(self.name);
                tracing::trace!(consumer = self.name, "Invalidation coalesced");
            }
            None => {}
        }
    }

    fn reload(self: &Arc<Self>) {
        let sequence = self.ticket.lock().force();
        if let Some(sequence) = sequence {
            self.start(sequence);
        }
    }

    fn start(self: &Arc<Self>, sequence: Sequence) {
        metrics::record_fetch_issued(self.name);
        tracing::debug!(consumer = self.name, sequence, "Fetch started");
        self.state.send_if_modified(|state| !std::mem::replace(&mut state.loading, true));

        let fetch = (self.fetcher)();
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            let result = fetch.await;
            metrics::record_fetch_duration(shared.name, started.elapsed());
            shared.finish(sequence, result);
        });
    }

    fn finish(self: &Arc<Self>, sequence: Sequence, result: Result<T, ApiError>) {
        if let Err(e) = &result {
            metrics::record_fetch_failure(self.name);
            tracing::warn!(consumer = self.name, sequence, error = %e, "Fetch failed");
        }

        let follow_up = {
            let mut ticket = self.ticket.lock();
            let completion = ticket.complete(sequence);
            let loading = ticket.is_loading();

            if completion.apply {
                self.state.send_modify(|state| {
                    match result {
                        Ok(data) => {
                            state.data = Some(data);
                            state.error = None;
                        }
                        Err(e) => state.error = Some(e.to_string()),
                    }
                    state.sequence = sequence;
                    state.loading = loading;
                });
            } else {
                metrics::record_stale_response(self.name);
                tracing::debug!(
                    consumer = self.name,
                    sequence,
                    closed = ticket.is_closed(),
                    "Fetch result discarded"
                );
                self.state
                    .send_if_modified(|state| std::mem::replace(&mut state.loading, loading) != loading);
            }
            completion.follow_up
        };

        if let Some(next) = follow_up {
            self.start(next);
        }
    }
}

/// Coalescing refresher for one consumer's authoritative state.
///
/// Dropping the coordinator tears it down. Fetch methods spawn onto the
/// current tokio runtime.
pub struct RefreshCoordinator<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + Sync + 'static> RefreshCoordinator<T> {
    /// Create an idle coordinator. Nothing is fetched until the first
    /// invalidation or reload.
    #[must_use]
    pub fn new(name: &'static str, fetcher: Fetcher<T>) -> Self {
        let (state, _) = watch::channel(ConsumerState::default());
        Self {
            shared: Arc::new(Shared {
                name,
                ticket: Mutex::new(RefreshTicket::new()),
                state,
                fetcher,
            }),
        }
    }

    /// A pushed event made the view stale.
    pub fn on_invalidate(&self) {
        self.shared.invalidate();
    }

    /// User-driven load: initial mount or manual retry.
    pub fn reload(&self) {
        self.shared.reload();
    }

    /// Stop applying results. In-flight fetches run to completion and are
    /// discarded.
    pub fn teardown(&self) {
        self.shared.ticket.lock().close();
        tracing::debug!(consumer = self.shared.name, "Consumer torn down");
    }

    /// Callback for registry listeners. Holds no strong reference, so it
    /// becomes a no-op once the coordinator is gone.
    #[must_use]
    pub fn invalidator(&self) -> impl Fn() + Send + Sync + 'static {
        let shared: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        move || {
            if let Some(shared) = shared.upgrade() {
                shared.invalidate();
            }
        }
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConsumerState<T>> {
        self.shared.state.subscribe()
    }

    /// Whether any fetch is outstanding, including discarded ones.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.shared.ticket.lock().is_loading()
    }

    /// Consumer name used in logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.shared.name
    }
}

impl<T: Clone + Send + Sync + 'static> RefreshCoordinator<T> {
    /// Copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> ConsumerState<T> {
        self.shared.state.borrow().clone()
    }
}

impl<T: Send + Sync + 'static> ConsumerProbe for RefreshCoordinator<T> {
    fn status(&self) -> RefreshStatus {
        let state = self.shared.state.borrow();
        RefreshStatus {
            name: self.shared.name,
            loading: state.loading,
            error: state.error.clone(),
            sequence: state.sequence,
            has_data: state.data.is_some(),
        }
    }
}

impl<T> Drop for RefreshCoordinator<T> {
    fn drop(&mut self) {
        self.shared.ticket.lock().close();
    }
}

impl<T> fmt::Debug for RefreshCoordinator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("name", &self.shared.name)
            .field("ticket", &*self.shared.ticket.lock())
            .finish_non_exhaustive()
    }
}
