//! Connection Lifecycle
//!
//! The state machine behind the connection manager. It is pure: every input
//! returns the states it moved through, and the caller decides how to notify
//! listeners about them.
//!
//! ```text
//! DISCONNECTED --connect()--------------> CONNECTING
//! CONNECTING   --handshake ok-----------> CONNECTED
//! CONNECTING   --protocol fault---------> ERROR
//! CONNECTED    --protocol fault---------> ERROR
//! CONNECTED    --disconnect/remote close-> DISCONNECTED
//! ERROR        --attempts < max---------> CONNECTING
//! ERROR        --attempts >= max--------> FAILED
//! FAILED       --connect()--------------> CONNECTING (attempts reset)
//! ```
//!
//! Two retry regimes share the machine. Transport faults never touch the
//! attempt counter; protocol faults increment it on every entry into ERROR.

use std::fmt;

use serde::Serialize;

/// Default bound on consecutive protocol faults.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

// =============================================================================
// Connection State
// =============================================================================

/// Connection state exposed to listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    /// No session and none being established.
    #[default]
    Disconnected,
    /// Handshake in progress or transport retry pending.
    Connecting,
    /// Handshake completed.
    Connected,
    /// Protocol fault observed; about to retry or fail.
    Error,
    /// Protocol retries exhausted. Terminal until `connect()`.
    Failed,
}

impl ConnectionState {
    /// Boolean projection used by simple consumers.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Connected => "CONNECTED",
            Self::Error => "ERROR",
            Self::Failed => "FAILED",
        }
    }

    /// Numeric code for the state gauge.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Connected => 2,
            Self::Error => 3,
            Self::Failed => 4,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

/// States entered by a single input, in order. Empty when nothing changed.
pub type Transitions = Vec<ConnectionState>;

/// Connection lifecycle with the bounded protocol-fault counter.
#[derive(Debug, Clone)]
pub struct ConnectionLifecycle {
    state: ConnectionState,
    attempts: u32,
    max_attempts: u32,
}

impl Default for ConnectionLifecycle {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl ConnectionLifecycle {
    /// Create a disconnected lifecycle. A bound of zero is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempts: 0,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive protocol faults since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured bound on consecutive protocol faults.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Explicit connect request.
    ///
    /// No-op while connecting or connected. From FAILED the attempt counter
    /// is reset.
    pub fn connect(&mut self) -> Transitions {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => Vec::new(),
            ConnectionState::Failed => {
                self.attempts = 0;
                self.enter(ConnectionState::Connecting)
            }
            ConnectionState::Disconnected | ConnectionState::Error => {
                self.enter(ConnectionState::Connecting)
            }
        }
    }

    /// The broker answered `CONNECTED`.
    pub fn handshake_succeeded(&mut self) -> Transitions {
        if self.state != ConnectionState::Connecting {
            return Vec::new();
        }
        self.attempts = 0;
        self.enter(ConnectionState::Connected)
    }

    /// The broker sent `ERROR` during or after the handshake.
    ///
    /// Moves through ERROR and then to CONNECTING or, once the bound is
    /// reached, FAILED.
    pub fn protocol_fault(&mut self) -> Transitions {
        if !matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            return Vec::new();
        }

        self.attempts = self.attempts.saturating_add(1);
        let mut entered = self.enter(ConnectionState::Error);
        let next = if self.attempts >= self.max_attempts {
            ConnectionState::Failed
        } else {
            ConnectionState::Connecting
        };
        entered.extend(self.enter(next));
        entered
    }

    /// The socket failed, timed out, or was closed by the remote side.
    ///
    /// An established session drops to DISCONNECTED. Before the handshake
    /// completes the state stays CONNECTING while the transport retry runs.
    pub fn transport_fault(&mut self) -> Transitions {
        match self.state {
            ConnectionState::Connected => self.enter(ConnectionState::Disconnected),
            _ => Vec::new(),
        }
    }

    /// The fixed transport retry delay elapsed.
    pub fn transport_retry(&mut self) -> Transitions {
        match self.state {
            ConnectionState::Disconnected => self.enter(ConnectionState::Connecting),
            _ => Vec::new(),
        }
    }

    /// Explicit teardown. Always reports DISCONNECTED, even when already there.
    pub fn disconnect(&mut self) -> Transitions {
        self.attempts = 0;
        self.state = ConnectionState::Disconnected;
        vec![ConnectionState::Disconnected]
    }

    /// Whether the session task should try again after the last input.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Disconnected
        )
    }

    fn enter(&mut self, next: ConnectionState) -> Transitions {
        self.state = next;
        vec![next]
    }
}
