//! STOMP Push Transport
//!
//! STOMP 1.2 over a WebSocket:
//!
//! - **frame**: text codec with header escaping and heart-beat EOLs
//! - **heartbeat**: negotiated heart-beats and silence detection
//! - **retry**: fixed-delay reconnect policy
//! - **connection**: the connection manager and its session task

pub mod connection;
pub mod frame;
pub mod heartbeat;
pub mod retry;

pub use connection::{ConnectionConfig, ConnectionManager, SessionError, StateListener};
pub use frame::{Command, Frame, FrameError, Frames, Inbound, StompCodec};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatManager, HeartbeatState, Heartbeats};
pub use retry::{RetryConfig, RetryPolicy};
