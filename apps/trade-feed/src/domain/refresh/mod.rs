//! Refresh Ticket
//!
//! Bookkeeping for one consumer's authoritative re-fetches: which fetches
//! were issued, which result was applied last, whether a trailing refresh is
//! owed, and whether the consumer is gone.
//!
//! The ticket decides; the coordinator in the application layer runs the
//! fetches. Every method is a constant-time update.

/// Sequence number tagging one fetch. Starts at 1.
pub type Sequence = u64;

/// What to do with a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Apply the result to consumer state.
    pub apply: bool,
    /// Sequence of the trailing fetch to start now, if one was owed.
    pub follow_up: Option<Sequence>,
}

/// Per-consumer fetch sequencing.
///
/// - At most one coalesced fetch in flight plus one pending trailing refresh
/// - Results applied only when newer than everything applied so far
/// - Nothing applied or started after [`RefreshTicket::close`]
#[derive(Debug, Default, Clone)]
pub struct RefreshTicket {
    issued: Sequence,
    applied: Sequence,
    in_flight: u32,
    trailing: bool,
    closed: bool,
}

impl RefreshTicket {
    /// Create an idle ticket.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A pushed event made the consumer's view stale.
    ///
    /// Returns the sequence of a fetch to start, or `None` when the
    /// invalidation was coalesced into a trailing refresh.
    pub fn invalidate(&mut self) -> Option<Sequence> {
        if self.closed {
            return None;
        }
        if self.in_flight > 0 {
            self.trailing = true;
            return None;
        }
        Some(self.issue())
    }

    /// User-driven load: always starts a fetch and satisfies any owed
    /// trailing refresh. Returns `None` only after close.
    pub fn force(&mut self) -> Option<Sequence> {
        if self.closed {
            return None;
        }
        self.trailing = false;
        Some(self.issue())
    }

    /// A fetch finished, successfully or not.
    pub fn complete(&mut self, sequence: Sequence) -> Completion {
        self.in_flight = self.in_flight.saturating_sub(1);

        if self.closed {
            return Completion {
                apply: false,
                follow_up: None,
            };
        }

        let apply = sequence > self.applied;
        if apply {
            self.applied = sequence;
        }

        let follow_up = if self.in_flight == 0 && self.trailing {
            self.trailing = false;
            Some(self.issue())
        } else {
            None
        };

        Completion { apply, follow_up }
    }

    /// Tear down. Pending and future results are discarded.
    pub fn close(&mut self) {
        self.closed = true;
        self.trailing = false;
    }

    /// Whether any fetch is outstanding.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.in_flight > 0
    }

    /// Whether a trailing refresh is owed.
    #[must_use]
    pub const fn has_trailing(&self) -> bool {
        self.trailing
    }

    /// Whether the ticket was closed.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Highest sequence applied so far (0 before the first success or failure).
    #[must_use]
    pub const fn applied(&self) -> Sequence {
        self.applied
    }

    /// Highest sequence issued so far.
    #[must_use]
    pub const fn issued(&self) -> Sequence {
        self.issued
    }

    fn issue(&mut self) -> Sequence {
        self.issued += 1;
        self.in_flight += 1;
        self.issued
    }
}
