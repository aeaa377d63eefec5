//! Heart-beat Manager
//!
//! STOMP heart-beating: the client proposes intervals in `CONNECT`, the broker
//! answers in `CONNECTED`, and both sides settle on the negotiated values.
//! The manager emits `SendBeat` at the outgoing interval and `Timeout` when
//! nothing has arrived for twice the incoming interval.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Silence tolerated on the incoming side, as a multiple of the interval.
const TIMEOUT_FACTOR: u32 = 2;

/// Heart-beat intervals the client asks for. Zero disables a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// How often the client can send.
    pub outgoing: Duration,
    /// How often the client wants to receive.
    pub incoming: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            outgoing: Duration::from_millis(4000),
            incoming: Duration::from_millis(4000),
        }
    }
}

impl HeartbeatConfig {
    /// Create a configuration.
    #[must_use]
    pub const fn new(outgoing: Duration, incoming: Duration) -> Self {
        Self { outgoing, incoming }
    }

    /// Value of the `heart-beat` header in `CONNECT`.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("{},{}", self.outgoing.as_millis(), self.incoming.as_millis())
    }

    /// Settle the intervals against the broker's `heart-beat` header.
    ///
    /// A missing or malformed header disables heart-beating.
    #[must_use]
    pub fn negotiate(&self, server: Option<&str>) -> Heartbeats {
        let Some((server_out, server_in)) = server.and_then(parse_header) else {
            return Heartbeats::default();
        };

        Heartbeats {
            outgoing: settle(self.outgoing, server_in),
            incoming: settle(self.incoming, server_out),
        }
    }
}

/// Negotiated intervals. `None` means the direction is off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Heartbeats {
    /// Client to broker.
    pub outgoing: Option<Duration>,
    /// Broker to client.
    pub incoming: Option<Duration>,
}

impl Heartbeats {
    /// Whether neither side beats.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.outgoing.is_none() && self.incoming.is_none()
    }
}

fn parse_header(raw: &str) -> Option<(Duration, Duration)> {
    let (out, inc) = raw.split_once(',')?;
    let out = out.trim().parse().ok()?;
    let inc = inc.trim().parse().ok()?;
    Some((Duration::from_millis(out), Duration::from_millis(inc)))
}

fn settle(ours: Duration, theirs: Duration) -> Option<Duration> {
    if ours.is_zero() || theirs.is_zero() {
        None
    } else {
        Some(ours.max(theirs))
    }
}

/// Events emitted by the heart-beat manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send an EOL to the broker.
    SendBeat,
    /// The broker has been silent too long.
    Timeout,
}

/// Receive-side bookkeeping shared with the session loop.
#[derive(Debug)]
pub struct HeartbeatState {
    last_received: RwLock<Instant>,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_received: RwLock::new(Instant::now()),
        }
    }

    /// Any inbound traffic counts as a beat.
    pub fn record_received(&self) {
        *self.last_received.write() = Instant::now();
    }

    /// Time since the last inbound traffic.
    #[must_use]
    pub fn time_since_received(&self) -> Duration {
        self.last_received.read().elapsed()
    }
}

/// Drives heart-beats for one session.
pub struct HeartbeatManager {
    heartbeats: Heartbeats,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a manager.
    #[must_use]
    pub const fn new(
        heartbeats: Heartbeats,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            heartbeats,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run until cancelled, the event channel closes, or a timeout fires.
    pub async fn run(self) {
        let mut send = self.heartbeats.outgoing.map(ticker);
        let mut check = self.heartbeats.incoming.map(ticker);
        let limit = self.heartbeats.incoming.map(|d| d * TIMEOUT_FACTOR);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heart-beat manager cancelled");
                    break;
                }
                () = tick(&mut send) => {
                    if self.event_tx.send(HeartbeatEvent::SendBeat).await.is_err() {
                        break;
                    }
                }
                () = tick(&mut check) => {
                    let elapsed = self.state.time_since_received();
                    if limit.is_some_and(|limit| elapsed > limit) {
                        tracing::warn!(
                            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                            "Heart-beat timeout detected"
                        );
                        let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
                        break;
                    }
                }
            }
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    #[test]
    fn header_value_in_millis() {
        assert_eq!(HeartbeatConfig::default().header_value(), "4000,4000");
        assert_eq!(HeartbeatConfig::new(ms(0), ms(250)).header_value(), "0,250");
    }

    #[test]
    fn negotiation_takes_the_larger_interval() {
        let config = HeartbeatConfig::new(ms(4000), ms(4000));
        let settled = config.negotiate(Some("10000,2000"));
        assert_eq!(settled.outgoing, Some(ms(4000)));
        assert_eq!(settled.incoming, Some(ms(10000)));
    }

    #[test]
    fn zero_on_either_side_disables_a_direction() {
        let config = HeartbeatConfig::new(ms(4000), ms(0));
        let settled = config.negotiate(Some("4000,0"));
        assert_eq!(settled, Heartbeats::default());
        assert!(settled.is_disabled());

        let settled = HeartbeatConfig::default().negotiate(Some("0,5000"));
        assert_eq!(settled.outgoing, Some(ms(5000)));
        assert_eq!(settled.incoming, None);
    }

    #[test]
    fn missing_or_malformed_header_disables() {
        let config = HeartbeatConfig::default();
        assert!(config.negotiate(None).is_disabled());
        assert!(config.negotiate(Some("soon")).is_disabled());
        assert!(config.negotiate(Some("1,x")).is_disabled());
    }

    #[tokio::test]
    async fn emits_beats_at_the_outgoing_interval() {
        let heartbeats = Heartbeats {
            outgoing: Some(ms(20)),
            incoming: None,
        };
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            HeartbeatManager::new(heartbeats, Arc::new(HeartbeatState::new()), tx, cancel.clone())
                .run(),
        );

        let event = tokio::time::timeout(ms(500), rx.recv()).await.unwrap();
        assert_eq!(event, Some(HeartbeatEvent::SendBeat));

        cancel.cancel();
        tokio::time::timeout(ms(500), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn silence_times_out() {
        let heartbeats = Heartbeats {
            outgoing: None,
            incoming: Some(ms(20)),
        };
        let (tx, mut rx) = mpsc::channel(4);
        let handle = tokio::spawn(
            HeartbeatManager::new(
                heartbeats,
                Arc::new(HeartbeatState::new()),
                tx,
                CancellationToken::new(),
            )
            .run(),
        );

        let event = tokio::time::timeout(ms(1000), rx.recv()).await.unwrap();
        assert_eq!(event, Some(HeartbeatEvent::Timeout));
        tokio::time::timeout(ms(500), handle).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn disabled_manager_only_stops_on_cancel() {
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(
            HeartbeatManager::new(
                Heartbeats::default(),
                Arc::new(HeartbeatState::new()),
                tx,
                cancel.clone(),
            )
            .run(),
        );

        assert!(tokio::time::timeout(ms(50), rx.recv()).await.is_err());
        cancel.cancel();
        tokio::time::timeout(ms(500), handle).await.unwrap().unwrap();
    }
}
