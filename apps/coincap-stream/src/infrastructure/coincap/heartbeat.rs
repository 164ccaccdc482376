//! Heartbeat Manager
//!
//! Engine.IO v3 puts the client in charge of liveness: it pings every
//! `pingInterval` and expects a pong within `pingTimeout`. The manager ticks
//! on the ping interval and asks the session reader to send pings; if a ping
//! stays unanswered past the timeout it reports [`HeartbeatEvent::Timeout`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::socketio::Handshake;

/// Heartbeat timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Interval between client pings.
    pub ping_interval: Duration,
    /// How long a ping may stay unanswered.
    pub pong_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(25),
            pong_timeout: Duration::from_secs(60),
        }
    }
}

impl HeartbeatConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(ping_interval: Duration, pong_timeout: Duration) -> Self {
        Self {
            ping_interval,
            pong_timeout,
        }
    }

    /// Timing advertised by the server in its open handshake.
    ///
    /// Zero values fall back to the defaults.
    #[must_use]
    pub fn from_handshake(handshake: &Handshake) -> Self {
        let defaults = Self::default();
        Self {
            ping_interval: non_zero_or(handshake.ping_interval(), defaults.ping_interval),
            pong_timeout: non_zero_or(handshake.ping_timeout(), defaults.pong_timeout),
        }
    }

    /// Replace fields with configured overrides, where set.
    #[must_use]
    pub fn with_overrides(
        self,
        ping_interval: Option<Duration>,
        pong_timeout: Option<Duration>,
    ) -> Self {
        Self {
            ping_interval: ping_interval.unwrap_or(self.ping_interval),
            pong_timeout: pong_timeout.unwrap_or(self.pong_timeout),
        }
    }
}

const fn non_zero_or(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() { fallback } else { value }
}

/// Events emitted by the heartbeat manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatEvent {
    /// Send a ping frame now.
    SendPing,
    /// A ping went unanswered; the connection is dead.
    Timeout,
}

/// State shared between the manager and the session reader.
#[derive(Debug)]
pub struct HeartbeatState {
    last_pong: RwLock<Instant>,
    waiting_for_pong: AtomicBool,
}

impl Default for HeartbeatState {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatState {
    /// Create new heartbeat state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last_pong: RwLock::new(Instant::now()),
            waiting_for_pong: AtomicBool::new(false),
        }
    }

    /// Record inbound proof of life (a pong, or any frame).
    pub fn record_pong(&self) {
        *self.last_pong.write() = Instant::now();
        self.waiting_for_pong.store(false, Ordering::SeqCst);
    }

    /// Mark that a ping is outstanding.
    ///
    /// The timeout clock starts at the first unanswered ping.
    pub fn mark_ping_sent(&self) {
        if !self.waiting_for_pong.swap(true, Ordering::SeqCst) {
            *self.last_pong.write() = Instant::now();
        }
    }

    /// Whether a ping is outstanding.
    #[must_use]
    pub fn is_waiting_for_pong(&self) -> bool {
        self.waiting_for_pong.load(Ordering::SeqCst)
    }

    /// Time since the last pong, or since the outstanding ping was sent.
    #[must_use]
    pub fn time_since_pong(&self) -> Duration {
        self.last_pong.read().elapsed()
    }
}

/// Heartbeat manager for one session.
///
/// Runs until cancelled, until the event receiver is dropped, or until it
/// reports a timeout.
pub struct HeartbeatManager {
    config: HeartbeatConfig,
    state: Arc<HeartbeatState>,
    event_tx: mpsc::Sender<HeartbeatEvent>,
    cancel: CancellationToken,
}

impl HeartbeatManager {
    /// Create a new heartbeat manager.
    #[must_use]
    pub const fn new(
        config: HeartbeatConfig,
        state: Arc<HeartbeatState>,
        event_tx: mpsc::Sender<HeartbeatEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            state,
            event_tx,
            cancel,
        }
    }

    /// Run the heartbeat loop.
    pub async fn run(self) {
        let start = tokio::time::Instant::now() + self.config.ping_interval;
        let mut interval = tokio::time::interval_at(start, self.config.ping_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat manager cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if self.check_and_ping().await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    /// Report a timeout or request the next ping.
    ///
    /// Returns `Err(())` when the loop should exit.
    async fn check_and_ping(&self) -> Result<(), ()> {
        if self.state.is_waiting_for_pong() {
            let elapsed = self.state.time_since_pong();
            if elapsed > self.config.pong_timeout {
                tracing::warn!(
                    elapsed_ms = elapsed.as_millis(),
                    timeout_ms = self.config.pong_timeout.as_millis(),
                    "Heartbeat timeout detected"
                );
                let _ = self.event_tx.send(HeartbeatEvent::Timeout).await;
                return Err(());
            }
        }

        if self.event_tx.send(HeartbeatEvent::SendPing).await.is_err() {
            tracing::debug!("Session reader gone, stopping heartbeat");
            return Err(());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_handshake() {
        let handshake = Handshake {
            sid: "s".to_string(),
            upgrades: vec![],
            ping_interval: 10_000,
            ping_timeout: 0,
        };
        let config = HeartbeatConfig::from_handshake(&handshake);
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.pong_timeout, HeartbeatConfig::default().pong_timeout);
    }

    #[test]
    fn config_overrides() {
        let config = HeartbeatConfig::default()
            .with_overrides(Some(Duration::from_secs(5)), None);
        assert_eq!(config.ping_interval, Duration::from_secs(5));
        assert_eq!(config.pong_timeout, Duration::from_secs(60));
    }

    #[test]
    fn state_tracks_outstanding_ping() {
        let state = HeartbeatState::new();
        assert!(!state.is_waiting_for_pong());

        state.mark_ping_sent();
        assert!(state.is_waiting_for_pong());

        state.record_pong();
        assert!(!state.is_waiting_for_pong());
    }

    #[tokio::test]
    async fn manager_requests_pings() {
        let config = HeartbeatConfig::new(Duration::from_millis(30), Duration::from_secs(1));
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatManager::new(config, state, event_tx, cancel.clone()).run(),
        );

        let event = tokio::time::timeout(Duration::from_millis(500), event_rx.recv())
            .await
            .expect("should receive event")
            .expect("channel should stay open");
        assert_eq!(event, HeartbeatEvent::SendPing);

        cancel.cancel();
        handle.await.expect("manager should exit");
    }

    #[tokio::test]
    async fn manager_reports_unanswered_ping() {
        let config = HeartbeatConfig::new(Duration::from_millis(20), Duration::from_millis(50));
        let state = Arc::new(HeartbeatState::new());
        let (event_tx, mut event_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatManager::new(config, Arc::clone(&state), event_tx, cancel).run(),
        );

        let mut timed_out = false;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(500), event_rx.recv()).await
        {
            match event {
                HeartbeatEvent::SendPing => state.mark_ping_sent(),
                HeartbeatEvent::Timeout => {
                    timed_out = true;
                    break;
                }
            }
        }

        assert!(timed_out, "unanswered pings should time out");
        let _ = tokio::time::timeout(Duration::from_millis(100), handle).await;
    }

    #[tokio::test]
    async fn manager_stops_on_cancel() {
        let config = HeartbeatConfig::new(Duration::from_secs(10), Duration::from_secs(10));
        let (event_tx, _event_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(
            HeartbeatManager::new(config, Arc::new(HeartbeatState::new()), event_tx, cancel.clone())
                .run(),
        );
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_millis(100), handle).await;
        assert!(result.is_ok(), "manager should shut down on cancellation");
    }
}
