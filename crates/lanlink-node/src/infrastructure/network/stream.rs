//! TCP stream channel: the single point-to-point connection to a peer.
//!
//! A [`StreamChannel`] makes exactly one connection attempt.  After that it
//! either runs until it is stopped or it ends up back in `Idle` having
//! signalled [`ConnectionFailure::CreateError`]; it never retries on its own.
//!
//! # Wire format
//!
//! Newline-terminated text lines.  The channel itself only ever writes
//! `{"msg":"ping"}` keepalives; application lines go through
//! [`StreamChannel::send`].
//!
//! # Heartbeat
//!
//! | silence `d`        | action                                           |
//! |--------------------|--------------------------------------------------|
//! | `d <= 2s`          | nothing                                          |
//! | `2s < d <= 15s`    | send `ping`, `Degraded`                          |
//! | `d > 15s`          | stop, signal `PingTimeout` once, end `Stopped`   |
//!
//! # Tasks
//!
//! A connected channel runs three Tokio tasks: the line reader, the writer
//! (fed through an unbounded queue so [`StreamChannel::send`] never blocks)
//! and the heartbeat.  [`StreamChannel::stop`] aborts all three, which drops
//! both halves of the socket.

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use lanlink_core::{
    ChannelState, Clock, ConnectionFailure, DiscoveryMessage, Endpoint, HeartbeatPolicy, Liveness,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpSocket, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ChannelError;
use crate::infrastructure::heartbeat::HeartbeatScheduler;
use crate::infrastructure::storage::config::{ConfigError, StreamConfig};
use crate::sync::lock;

/// Receives the lifecycle of one [`StreamChannel`].
#[cfg_attr(test, mockall::automock)]
pub trait ConnectionListener: Send + Sync {
    /// The connection is open and supervised.
    fn on_connection_success(&self);

    /// The attempt failed, or the peer went silent past the timeout.
    fn on_connection_failed(&self, failure: ConnectionFailure);

    /// A line arrived from the peer.
    fn on_line_received(&self, _line: &str) {}
}

/// Timing parameters for a [`StreamChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    pub connect_timeout: Duration,
    pub policy: HeartbeatPolicy,
}

impl StreamSettings {
    /// Builds settings from the `[stream]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTiming`] for out-of-range values.
    pub fn from_config(config: &StreamConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            connect_timeout: config.connect_timeout()?,
            policy: config.heartbeat_policy()?,
        })
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            policy: HeartbeatPolicy::STREAM,
        }
    }
}

/// One supervised TCP connection.
pub struct StreamChannel {
    session_id: Uuid,
    settings: StreamSettings,
    listener: Arc<dyn ConnectionListener>,
    clock: Arc<dyn Clock>,
    state: Mutex<ChannelState>,
    endpoint: Mutex<Option<Endpoint>>,
    last_activity: Mutex<Instant>,
    writer: Mutex<Option<mpsc::UnboundedSender<String>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    heartbeat: HeartbeatScheduler,
}

impl StreamChannel {
    pub fn new(
        settings: StreamSettings,
        listener: Arc<dyn ConnectionListener>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let session_id = Uuid::new_v4();
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me = me.clone();
            let heartbeat = HeartbeatScheduler::with_callback(
                format!("stream-{session_id}"),
                Arc::new(move || {
                    if let Some(channel) = me.upgrade() {
                        channel.heartbeat_tick();
                    }
                }),
            );
            let now = clock.now();
            Self {
                session_id,
                settings,
                listener,
                clock,
                state: Mutex::new(ChannelState::Idle),
                endpoint: Mutex::new(None),
                last_activity: Mutex::new(now),
                writer: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                heartbeat,
            }
        })
    }

    /// Makes a single connection attempt to `endpoint`.
    ///
    /// On success the channel is `Active` and `on_connection_success` has been
    /// signalled.  On failure `on_connection_failed(CreateError)` has been
    /// signalled and the channel is back in `Idle`.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::InvalidState`] if the channel is not `Idle` (nothing
    ///   is signalled), or if it was stopped while the attempt was in flight.
    /// - [`ChannelError::Resolve`], [`ChannelError::Connect`] or
    ///   [`ChannelError::ConnectTimeout`] when the attempt fails.
    pub async fn connect(self: &Arc<Self>, endpoint: Endpoint) -> Result<(), ChannelError> {
        self.begin(&endpoint)?;
        self.establish(endpoint).await
    }

    /// Like [`connect`](Self::connect), but moves to `Starting` immediately
    /// and runs the attempt on its own task.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::InvalidState`] if the channel is not `Idle`.
    pub fn spawn_connect(self: &Arc<Self>, endpoint: Endpoint) -> Result<(), ChannelError> {
        self.begin(&endpoint)?;
        let this = Arc::clone(self);
        let attempt = tokio::spawn(async move {
            // Failures have already been signalled and logged.
            let _ = this.establish(endpoint).await;
        });
        lock(&self.tasks).push(attempt);
        Ok(())
    }

    /// Queues one line for the peer.  Returns `false` if it was dropped.
    pub fn send(&self, payload: impl Into<String>) -> bool {
        let payload = payload.into();
        let writer = {
            let state = lock(&self.state);
            match lock(&self.writer).clone() {
                Some(writer) if state.is_running() => writer,
                _ => {
                    debug!("stream send while {}; dropped", *state);
                    return false;
                }
            }
        };
        let line = payload.trim_end_matches(['\r', '\n']).to_string();
        if writer.send(line).is_err() {
            warn!("stream writer for session {} has gone away", self.session_id);
            return false;
        }
        true
    }

    /// Cancels the heartbeat and closes the connection.  Returns `true` only
    /// for the call that performed the transition to `Stopped`.
    pub fn stop(&self) -> bool {
        let previous = {
            let mut state = lock(&self.state);
            if state.is_terminal() {
                return false;
            }
            let previous = *state;
            *state = ChannelState::Stopped;
            self.heartbeat.stop();
            lock(&self.writer).take();
            for task in lock(&self.tasks).drain(..) {
                task.abort();
            }
            previous
        };
        info!("stream session {} stopped (was {previous})", self.session_id);
        true
    }

    /// Runs one heartbeat check.  Returns `None` when the channel is not
    /// running.
    pub fn heartbeat_tick(&self) -> Option<Liveness> {
        let verdict = {
            let mut state = lock(&self.state);
            if !state.is_running() {
                return None;
            }
            let elapsed = self
                .clock
                .now()
                .saturating_duration_since(*lock(&self.last_activity));
            let verdict = self.settings.policy.assess(elapsed);
            match verdict {
                Liveness::Overdue => *state = ChannelState::Degraded,
                Liveness::Quiet if *state == ChannelState::Degraded => {
                    *state = ChannelState::Active;
                }
                _ => {}
            }
            verdict
        };

        match verdict {
            Liveness::TimedOut => {
                warn!(
                    "stream peer silent for over {:?}; closing session {}",
                    self.settings.policy.timeout_after, self.session_id
                );
                if self.stop() {
                    self.listener.on_connection_failed(ConnectionFailure::PingTimeout);
                }
            }
            Liveness::Overdue => {
                self.send(DiscoveryMessage::Ping.encode());
            }
            Liveness::Quiet => {}
        }
        Some(verdict)
    }

    pub fn state(&self) -> ChannelState {
        *lock(&self.state)
    }

    /// The endpoint passed to `connect`, once an attempt has begun.
    pub fn endpoint(&self) -> Option<Endpoint> {
        lock(&self.endpoint).clone()
    }

    /// Identifier used in logs to tell successive connections apart.
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn last_activity(&self) -> Instant {
        *lock(&self.last_activity)
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.is_running()
    }

    fn begin(&self, endpoint: &Endpoint) -> Result<(), ChannelError> {
        let mut state = lock(&self.state);
        if *state != ChannelState::Idle {
            return Err(ChannelError::InvalidState {
                operation: "connect",
                state: *state,
            });
        }
        *state = ChannelState::Starting;
        *lock(&self.endpoint) = Some(endpoint.clone());
        Ok(())
    }

    async fn establish(self: &Arc<Self>, endpoint: Endpoint) -> Result<(), ChannelError> {
        debug!("stream session {} connecting to {endpoint}", self.session_id);
        let stream = match open(&endpoint, self.settings.connect_timeout).await {
            Ok(stream) => stream,
            Err(e) => {
                let reverted = {
                    let mut state = lock(&self.state);
                    let starting = *state == ChannelState::Starting;
                    if starting {
                        *state = ChannelState::Idle;
                    }
                    starting
                };
                if reverted {
                    warn!("stream session {}: {e}", self.session_id);
                    self.listener.on_connection_failed(ConnectionFailure::CreateError);
                }
                return Err(e);
            }
        };
        let (read_half, write_half) = stream.into_split();

        {
            let mut state = lock(&self.state);
            if *state != ChannelState::Starting {
                debug!(
                    "stream session {} stopped while connecting; dropping connection",
                    self.session_id
                );
                return Err(ChannelError::InvalidState {
                    operation: "connect",
                    state: *state,
                });
            }
            self.record_activity_locked();
            let (tx, rx) = mpsc::unbounded_channel();
            *lock(&self.writer) = Some(tx);
            let mut tasks = lock(&self.tasks);
            tasks.push(tokio::spawn(read_loop(Arc::downgrade(self), read_half)));
            tasks.push(tokio::spawn(write_loop(self.session_id, rx, write_half)));
            *state = ChannelState::Active;
            let period = self.settings.policy.period;
            self.heartbeat.start(period, period);
        }

        info!("stream session {} connected to {endpoint}", self.session_id);
        self.listener.on_connection_success();
        Ok(())
    }

    fn record_activity(&self) {
        let mut state = lock(&self.state);
        if *state == ChannelState::Degraded {
            *state = ChannelState::Active;
        }
        self.record_activity_locked();
    }

    /// Caller holds the state lock.
    fn record_activity_locked(&self) {
        let now = self.clock.now();
        let mut last = lock(&self.last_activity);
        if now > *last {
            *last = now;
        }
    }
}

impl Drop for StreamChannel {
    fn drop(&mut self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }
}

impl std::fmt::Debug for StreamChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamChannel")
            .field("session_id", &self.session_id)
            .field("endpoint", &self.endpoint())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

async fn open(endpoint: &Endpoint, connect_timeout: Duration) -> Result<TcpStream, ChannelError> {
    let attempt = async {
        let addrs = lookup_host((endpoint.host(), endpoint.port()))
            .await
            .map_err(|source| ChannelError::Resolve {
                endpoint: endpoint.clone(),
                source,
            })?;

        let mut last_error = None;
        for addr in addrs {
            match connect_addr(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!("connect to {addr} failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        Err(ChannelError::Connect {
            endpoint: endpoint.clone(),
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses resolved")),
        })
    };

    match time::timeout(connect_timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(ChannelError::ConnectTimeout {
            endpoint: endpoint.clone(),
            timeout: connect_timeout,
        }),
    }
}

async fn connect_addr(addr: SocketAddr) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(true)?;
    socket.set_reuseaddr(true)?;
    let stream = socket.connect(addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn read_loop(channel: Weak<StreamChannel>, read_half: OwnedReadHalf) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some(channel) = channel.upgrade() else {
                    break;
                };
                channel.record_activity();
                channel.listener.on_line_received(&line);
            }
            Ok(None) => {
                debug!("stream closed by peer");
                break;
            }
            Err(e) => {
                debug!("stream read ended: {e}");
                break;
            }
        }
    }
}

async fn write_loop(
    session_id: Uuid,
    mut rx: mpsc::UnboundedReceiver<String>,
    write_half: OwnedWriteHalf,
) {
    let mut writer = BufWriter::new(write_half);
    while let Some(line) = rx.recv().await {
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!("stream session {session_id} write failed: {e}");
            break;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use lanlink_core::ManualClock;
    use mockall::predicate::eq;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    #[derive(Debug, PartialEq)]
    enum Signal {
        Success,
        Failed(ConnectionFailure),
        Line(String),
    }

    struct Recorder(mpsc::UnboundedSender<Signal>);

    impl ConnectionListener for Recorder {
        fn on_connection_success(&self) {
            let _ = self.0.send(Signal::Success);
        }
        fn on_connection_failed(&self, failure: ConnectionFailure) {
            let _ = self.0.send(Signal::Failed(failure));
        }
        fn on_line_received(&self, line: &str) {
            let _ = self.0.send(Signal::Line(line.to_string()));
        }
    }

    fn quiet_settings() -> StreamSettings {
        StreamSettings {
            connect_timeout: Duration::from_secs(2),
            policy: HeartbeatPolicy {
                period: Duration::from_secs(3_600),
                ..HeartbeatPolicy::STREAM
            },
        }
    }

    fn recorder() -> (Arc<Recorder>, mpsc::UnboundedReceiver<Signal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Recorder(tx)), rx)
    }

    async fn listener() -> (TcpListener, Endpoint) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(listener.local_addr().unwrap());
        (listener, endpoint)
    }

    async fn refused_endpoint() -> Endpoint {
        let (listener, endpoint) = listener().await;
        drop(listener);
        endpoint
    }

    #[tokio::test]
    async fn test_connect_success_activates_and_signals() {
        // Arrange
        let (server, endpoint) = listener().await;
        let (rec, mut signals) = recorder();
        let channel = StreamChannel::new(quiet_settings(), rec, Arc::new(ManualClock::new()));

        // Act
        channel.connect(endpoint.clone()).await.expect("connect loopback");
        let (_peer, _) = server.accept().await.unwrap();

        // Assert
        assert_eq!(channel.state(), ChannelState::Active);
        assert_eq!(channel.endpoint(), Some(endpoint));
        assert!(channel.heartbeat_running());
        assert_eq!(signals.recv().await, Some(Signal::Success));
        channel.stop();
    }

    #[tokio::test]
    async fn test_connect_refused_signals_create_error_once_and_returns_to_idle() {
        // Arrange
        let endpoint = refused_endpoint().await;
        let mut mock = MockConnectionListener::new();
        mock.expect_on_connection_failed()
            .with(eq(ConnectionFailure::CreateError))
            .times(1)
            .return_const(());
        mock.expect_on_connection_success().never();
        let channel = StreamChannel::new(quiet_settings(), Arc::new(mock), Arc::new(ManualClock::new()));

        // Act
        let result = channel.connect(endpoint).await;

        // Assert
        assert!(matches!(result, Err(ChannelError::Connect { .. })));
        assert_eq!(channel.state(), ChannelState::Idle);
        assert!(!channel.heartbeat_running());
    }

    #[tokio::test]
    async fn test_connect_when_not_idle_is_rejected_without_signal() {
        // Arrange
        let (server, endpoint) = listener().await;
        let (rec, mut signals) = recorder();
        let channel = StreamChannel::new(quiet_settings(), rec, Arc::new(ManualClock::new()));
        channel.connect(endpoint.clone()).await.unwrap();
        let _peer = server.accept().await.unwrap();
        assert_eq!(signals.recv().await, Some(Signal::Success));

        // Act
        let err = channel.connect(endpoint).await.unwrap_err();

        // Assert
        assert!(matches!(
            err,
            ChannelError::InvalidState {
                operation: "connect",
                state: ChannelState::Active
            }
        ));
        assert!(signals.try_recv().is_err());
        channel.stop();
    }

    #[tokio::test]
    async fn test_spawn_connect_is_starting_immediately() {
        let (server, endpoint) = listener().await;
        let (rec, mut signals) = recorder();
        let channel = StreamChannel::new(quiet_settings(), rec, Arc::new(ManualClock::new()));

        channel.spawn_connect(endpoint).unwrap();
        assert_eq!(channel.state(), ChannelState::Starting);

        let _peer = server.accept().await.unwrap();
        assert_eq!(timeout(WAIT, signals.recv()).await.unwrap(), Some(Signal::Success));
        assert_eq!(channel.state(), ChannelState::Active);
        channel.stop();
    }

    #[tokio::test]
    async fn test_stop_during_connect_drops_connection_silently() {
        // Arrange
        let (server, endpoint) = listener().await;
        let (rec, mut signals) = recorder();
        let channel = StreamChannel::new(quiet_settings(), rec, Arc::new(ManualClock::new()));

        // Act
        channel.spawn_connect(endpoint).unwrap();
        assert!(channel.stop());
        tokio::task::yield_now().await;

        // Assert
        assert_eq!(channel.state(), ChannelState::Stopped);
        assert!(timeout(Duration::from_millis(200), signals.recv()).await.is_err());
        drop(server);
    }

    #[tokio::test]
    async fn test_overdue_tick_sends_ping_line() {
        // Arrange
        let (server, endpoint) = listener().await;
        let (rec, _signals) = recorder();
        let clock = Arc::new(ManualClock::new());
        let channel = StreamChannel::new(quiet_settings(), rec, clock.clone());
        channel.connect(endpoint).await.unwrap();
        let (peer, _) = server.accept().await.unwrap();
        let mut peer_lines = BufReader::new(peer).lines();

        // Act
        clock.advance(Duration::from_millis(2_001));
        let verdict = channel.heartbeat_tick();

        // Assert
        assert_eq!(verdict, Some(Liveness::Overdue));
        assert_eq!(channel.state(), ChannelState::Degraded);
        let line = timeout(WAIT, peer_lines.next_line()).await.unwrap().unwrap();
        assert_eq!(line.as_deref(), Some(r#"{"msg":"ping"}"#));
        channel.stop();
    }

    #[tokio::test]
    async fn test_no_keepalive_within_two_seconds() {
        let (server, endpoint) = listener().await;
        let (rec, _signals) = recorder();
        let clock = Arc::new(ManualClock::new());
        let channel = StreamChannel::new(quiet_settings(), rec, clock.clone());
        channel.connect(endpoint).await.unwrap();
        let _peer = server.accept().await.unwrap();

        clock.advance(Duration::from_secs(2));

        assert_eq!(channel.heartbeat_tick(), Some(Liveness::Quiet));
        assert_eq!(channel.state(), ChannelState::Active);
        channel.stop();
    }

    #[tokio::test]
    async fn test_timeout_stops_and_signals_ping_timeout_exactly_once() {
        // Arrange
        let (server, endpoint) = listener().await;
        let (rec, mut signals) = recorder();
        let clock = Arc::new(ManualClock::new());
        let channel = StreamChannel::new(quiet_settings(), rec, clock.clone());
        channel.connect(endpoint).await.unwrap();
        let _peer = server.accept().await.unwrap();
        assert_eq!(signals.recv().await, Some(Signal::Success));

        // Act
        clock.advance(Duration::from_secs(16));
        let first = channel.heartbeat_tick();
        let second = channel.heartbeat_tick();

        // Assert
        assert_eq!(first, Some(Liveness::TimedOut));
        assert_eq!(second, None);
        assert_eq!(channel.state(), ChannelState::Stopped);
        assert!(!channel.heartbeat_running());
        assert_eq!(
            signals.recv().await,
            Some(Signal::Failed(ConnectionFailure::PingTimeout))
        );
        assert!(signals.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_inbound_line_refreshes_activity_and_is_forwarded() {
        // Arrange
        let (server, endpoint) = listener().await;
        let (rec, mut signals) = recorder();
        let clock = Arc::new(ManualClock::new());
        let channel = StreamChannel::new(quiet_settings(), rec, clock.clone());
        channel.connect(endpoint).await.unwrap();
        let (mut peer, _) = server.accept().await.unwrap();
        assert_eq!(signals.recv().await, Some(Signal::Success));
        clock.advance(Duration::from_secs(3));
        channel.heartbeat_tick();
        assert_eq!(channel.state(), ChannelState::Degraded);

        // Act
        peer.write_all(b"{\"msg\":\"heartbeat\"}\n").await.unwrap();

        // Assert
        let got = timeout(WAIT, signals.recv()).await.unwrap();
        assert_eq!(got, Some(Signal::Line(r#"{"msg":"heartbeat"}"#.to_string())));
        assert_eq!(channel.state(), ChannelState::Active);
        assert_eq!(channel.last_activity(), clock.now());
        assert_eq!(channel.heartbeat_tick(), Some(Liveness::Quiet));
        channel.stop();
    }

    #[tokio::test]
    async fn test_peer_eof_leaves_detection_to_heartbeat() {
        let (server, endpoint) = listener().await;
        let (rec, _signals) = recorder();
        let channel = StreamChannel::new(quiet_settings(), rec, Arc::new(ManualClock::new()));
        channel.connect(endpoint).await.unwrap();
        let (peer, _) = server.accept().await.unwrap();

        drop(peer);
        time::sleep(Duration::from_millis(50)).await;

        assert_eq!(channel.state(), ChannelState::Active);
        channel.stop();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (server, endpoint) = listener().await;
        let (rec, _signals) = recorder();
        let channel = StreamChannel::new(quiet_settings(), rec, Arc::new(ManualClock::new()));
        channel.connect(endpoint).await.unwrap();
        let _peer = server.accept().await.unwrap();

        assert!(channel.stop());
        assert!(!channel.stop());
        assert!(!channel.send("late"));
        assert_eq!(channel.state(), ChannelState::Stopped);
    }

    #[tokio::test]
    async fn test_send_writes_newline_terminated_line() {
        let (server, endpoint) = listener().await;
        let (rec, _signals) = recorder();
        let channel = StreamChannel::new(quiet_settings(), rec, Arc::new(ManualClock::new()));
        channel.connect(endpoint).await.unwrap();
        let (peer, _) = server.accept().await.unwrap();
        let mut peer_lines = BufReader::new(peer).lines();

        assert!(channel.send("hello\n"));

        let line = timeout(WAIT, peer_lines.next_line()).await.unwrap().unwrap();
        assert_eq!(line.as_deref(), Some("hello"));
        channel.stop();
    }

    #[test]
    fn test_settings_from_default_config() {
        let settings = StreamSettings::from_config(&StreamConfig::default()).unwrap();
        assert_eq!(settings, StreamSettings::default());
    }

    #[test]
    fn test_settings_from_config_rejects_inverted_thresholds() {
        let config = StreamConfig {
            keepalive_after_ms: 30_000,
            ..StreamConfig::default()
        };
        assert!(matches!(
            StreamSettings::from_config(&config),
            Err(ConfigError::InvalidTiming { .. })
        ));
    }
}
