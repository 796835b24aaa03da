//! ConnectionCoordinator: hands a discovered peer over from the datagram
//! channel to a single stream connection and back.
//!
//! ```text
//!   announcement ──► no active stream? ──yes──► StreamChannel::spawn_connect
//!                          │ no                        │
//!                       ignored           success ─────┼───── CreateError
//!                                            │         │          │
//!                          suppress discovery heartbeat│   clear active slot
//!                                                      │
//!                                                 PingTimeout
//!                                                      │
//!                          resume discovery heartbeat, clear active slot
//! ```
//!
//! Every stream gets a generation number when it is created.  Notifications
//! carry that number and are dropped when it no longer matches the active
//! stream, so a late signal from a torn-down connection can never clear or
//! suppress anything on behalf of its successor.
//!
//! Everything the coordinator reacts to is also forwarded to the application
//! as a [`LinkEvent`] on the receiver returned by [`ConnectionCoordinator::new`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use lanlink_core::{ChannelState, Clock, ConnectionFailure, DiscoveryMessage, Endpoint};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::infrastructure::clock::TokioClock;
use crate::infrastructure::network::broadcast::StaticBroadcastResolver;
use crate::infrastructure::network::datagram::{DatagramChannel, DatagramSettings, MessageListener};
use crate::infrastructure::network::stream::{ConnectionListener, StreamChannel, StreamSettings};
use crate::infrastructure::network::ChannelError;
use crate::infrastructure::storage::config::{AppConfig, ConfigError};
use crate::sync::lock;

/// Capacity of the [`LinkEvent`] queue.
const EVENT_CAPACITY: usize = 64;

/// Something the application may want to know about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// An announcement started a connection attempt to this endpoint.
    Discovered(Endpoint),
    /// The stream connection is up; discovery keepalives are paused.
    Connected(Endpoint),
    /// The stream connection failed or timed out.
    ConnectionFailed {
        endpoint: Endpoint,
        failure: ConnectionFailure,
    },
    /// A non-keepalive line arrived on the stream connection.
    PeerMessage(String),
}

struct ActiveStream {
    generation: u64,
    channel: Arc<StreamChannel>,
}

/// Composes the datagram channel with at most one stream channel.
pub struct ConnectionCoordinator {
    me: Weak<Self>,
    datagram: Arc<DatagramChannel>,
    stream_settings: StreamSettings,
    clock: Arc<dyn Clock>,
    active: Mutex<Option<ActiveStream>>,
    generation: AtomicU64,
    subscribed: AtomicBool,
    events: mpsc::Sender<LinkEvent>,
}

impl ConnectionCoordinator {
    /// Creates a coordinator around `datagram`.
    ///
    /// Returns the coordinator and the receiver for its [`LinkEvent`]s.
    pub fn new(
        datagram: Arc<DatagramChannel>,
        stream_settings: StreamSettings,
        clock: Arc<dyn Clock>,
    ) -> (Arc<Self>, mpsc::Receiver<LinkEvent>) {
        let (events, rx) = mpsc::channel(EVENT_CAPACITY);
        let coordinator = Arc::new_cyclic(|me| Self {
            me: me.clone(),
            datagram,
            stream_settings,
            clock,
            active: Mutex::new(None),
            generation: AtomicU64::new(0),
            subscribed: AtomicBool::new(false),
            events,
        });
        (coordinator, rx)
    }

    /// Builds the datagram channel and the coordinator from `config`, using
    /// the configured broadcast address and the Tokio clock.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] for unparsable addresses and
    /// [`ConfigError::InvalidTiming`] for out-of-range timing values.
    pub fn from_config(
        config: &AppConfig,
    ) -> Result<(Arc<Self>, mpsc::Receiver<LinkEvent>), ConfigError> {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);
        let datagram = DatagramChannel::new(
            DatagramSettings::from_config(&config.discovery)?,
            Arc::new(StaticBroadcastResolver::from_config(&config.discovery)?),
            Arc::clone(&clock),
        );
        Ok(Self::new(
            datagram,
            StreamSettings::from_config(&config.stream)?,
            clock,
        ))
    }

    /// Subscribes to the datagram channel and starts it.
    ///
    /// # Errors
    ///
    /// Propagates [`ChannelError`] from [`DatagramChannel::start`].
    pub async fn start(&self) -> Result<SocketAddr, ChannelError> {
        if !self.subscribed.swap(true, Ordering::SeqCst) {
            self.datagram.subscribe(DiscoveryForwarder {
                coordinator: self.me.clone(),
            });
        }
        self.datagram.start().await
    }

    /// Reacts to one inbound discovery message.
    ///
    /// Returns `true` when the message launched a connection attempt.  Only a
    /// valid announcement arriving while no stream is active does.
    pub fn handle_discovery(&self, text: &str) -> bool {
        let endpoint = match DiscoveryMessage::decode(text) {
            Ok(message) => match message.endpoint() {
                Some(Ok(endpoint)) => endpoint,
                Some(Err(e)) => {
                    debug!("ignoring announcement {text:?}: {e}");
                    return false;
                }
                None => {
                    debug!("discovery {} needs no action", message.kind_name());
                    return false;
                }
            },
            Err(e) => {
                debug!("ignoring discovery payload {text:?}: {e}");
                return false;
            }
        };

        let mut active = lock(&self.active);
        if let Some(current) = active.as_ref() {
            debug!(
                "stream to {} is {}; ignoring announcement of {endpoint}",
                describe(current.channel.endpoint()),
                current.channel.state()
            );
            return false;
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let watcher = Arc::new(StreamWatcher {
            coordinator: self.me.clone(),
            generation,
            endpoint: endpoint.clone(),
        });
        let channel = StreamChannel::new(self.stream_settings, watcher, Arc::clone(&self.clock));
        if let Err(e) = channel.spawn_connect(endpoint.clone()) {
            warn!("could not start connection to {endpoint}: {e}");
            return false;
        }
        info!("discovered {endpoint}; connecting (session {})", channel.session_id());
        *active = Some(ActiveStream {
            generation,
            channel,
        });
        self.emit(LinkEvent::Discovered(endpoint));
        true
    }

    /// Tears down the active stream and resumes the discovery heartbeat.
    /// Returns `false` when there was no stream.
    pub fn disconnect(&self) -> bool {
        let mut active = lock(&self.active);
        let Some(current) = active.take() else {
            return false;
        };
        current.channel.stop();
        self.datagram.resume_heartbeat();
        info!("disconnected from {}", describe(current.channel.endpoint()));
        true
    }

    /// Tears down the active stream and the datagram channel.
    pub fn stop(&self) {
        if let Some(current) = lock(&self.active).take() {
            current.channel.stop();
        }
        self.datagram.stop();
    }

    /// Broadcasts `payload` on the discovery channel.
    pub fn broadcast(&self, payload: impl Into<String>) {
        self.datagram.send(payload);
    }

    /// Broadcasts an announcement of `endpoint`.
    pub fn announce(&self, endpoint: &Endpoint) {
        self.datagram.send_message(&DiscoveryMessage::announce(endpoint));
    }

    /// Sends one line on the active stream.  Returns `false` when there is no
    /// running stream.
    pub fn send_to_peer(&self, payload: impl Into<String>) -> bool {
        match self.active_stream() {
            Some(channel) => channel.send(payload),
            None => false,
        }
    }

    pub fn active_endpoint(&self) -> Option<Endpoint> {
        lock(&self.active)
            .as_ref()
            .and_then(|current| current.channel.endpoint())
    }

    pub fn active_state(&self) -> Option<ChannelState> {
        lock(&self.active)
            .as_ref()
            .map(|current| current.channel.state())
    }

    pub fn active_stream(&self) -> Option<Arc<StreamChannel>> {
        lock(&self.active)
            .as_ref()
            .map(|current| Arc::clone(&current.channel))
    }

    pub fn datagram(&self) -> &Arc<DatagramChannel> {
        &self.datagram
    }

    fn on_stream_connected(&self, generation: u64, endpoint: &Endpoint) {
        {
            let active = lock(&self.active);
            if !is_current(&active, generation) {
                debug!("ignoring success from stale stream to {endpoint}");
                return;
            }
            self.datagram.suppress_heartbeat();
        }
        info!("connected to {endpoint}; discovery heartbeat suppressed");
        self.emit(LinkEvent::Connected(endpoint.clone()));
    }

    fn on_stream_failed(&self, generation: u64, endpoint: &Endpoint, failure: ConnectionFailure) {
        let _finished = {
            let mut active = lock(&self.active);
            if !is_current(&active, generation) {
                debug!("ignoring {failure} from stale stream to {endpoint}");
                return;
            }
            if failure == ConnectionFailure::PingTimeout {
                self.datagram.resume_heartbeat();
            }
            active.take()
        };
        warn!("connection to {endpoint} failed: {failure}");
        self.emit(LinkEvent::ConnectionFailed {
            endpoint: endpoint.clone(),
            failure,
        });
    }

    fn on_stream_line(&self, generation: u64, line: &str) {
        if !is_current(&lock(&self.active), generation) {
            return;
        }
        match DiscoveryMessage::decode(line) {
            Ok(message) if message.is_keepalive() => {
                debug!("stream keepalive: {}", message.kind_name());
            }
            _ => self.emit(LinkEvent::PeerMessage(line.to_string())),
        }
    }

    fn emit(&self, event: LinkEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => debug!("event queue full; dropped {event:?}"),
            Err(TrySendError::Closed(event)) => debug!("event queue closed; dropped {event:?}"),
        }
    }
}

impl std::fmt::Debug for ConnectionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCoordinator")
            .field("datagram", &self.datagram)
            .field("active_endpoint", &self.active_endpoint())
            .finish_non_exhaustive()
    }
}

fn is_current(active: &Option<ActiveStream>, generation: u64) -> bool {
    active
        .as_ref()
        .is_some_and(|current| current.generation == generation)
}

fn describe(endpoint: Option<Endpoint>) -> String {
    endpoint.map_or_else(|| "<unknown>".to_string(), |e| e.to_string())
}

/// Feeds inbound datagrams to the coordinator.
struct DiscoveryForwarder {
    coordinator: Weak<ConnectionCoordinator>,
}

impl MessageListener for DiscoveryForwarder {
    fn on_message_received(&self, text: &str) -> anyhow::Result<()> {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.handle_discovery(text);
        }
        Ok(())
    }
}

/// Routes one stream's signals back to the coordinator, tagged with the
/// stream's generation.
struct StreamWatcher {
    coordinator: Weak<ConnectionCoordinator>,
    generation: u64,
    endpoint: Endpoint,
}

impl ConnectionListener for StreamWatcher {
    fn on_connection_success(&self) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.on_stream_connected(self.generation, &self.endpoint);
        }
    }

    fn on_connection_failed(&self, failure: ConnectionFailure) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.on_stream_failed(self.generation, &self.endpoint, failure);
        }
    }

    fn on_line_received(&self, line: &str) {
        if let Some(coordinator) = self.coordinator.upgrade() {
            coordinator.on_stream_line(self.generation, line);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use lanlink_core::{HeartbeatPolicy, Liveness, ManualClock};
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(2);

    fn quiet(policy: HeartbeatPolicy) -> HeartbeatPolicy {
        HeartbeatPolicy {
            period: Duration::from_secs(3_600),
            ..policy
        }
    }

    fn coordinator(clock: Arc<ManualClock>) -> (Arc<ConnectionCoordinator>, mpsc::Receiver<LinkEvent>) {
        let datagram = DatagramChannel::new(
            DatagramSettings {
                bind_addr: "127.0.0.1:0".parse().unwrap(),
                broadcast_port: 9,
                policy: quiet(HeartbeatPolicy::DATAGRAM),
            },
            Arc::new(StaticBroadcastResolver::new(IpAddr::V4(Ipv4Addr::LOCALHOST))),
            clock.clone(),
        );
        let settings = StreamSettings {
            connect_timeout: WAIT,
            policy: quiet(HeartbeatPolicy::STREAM),
        };
        ConnectionCoordinator::new(datagram, settings, clock)
    }

    fn announcement(endpoint: &Endpoint) -> String {
        DiscoveryMessage::announce(endpoint).encode()
    }

    async fn next(events: &mut mpsc::Receiver<LinkEvent>) -> LinkEvent {
        timeout(WAIT, events.recv())
            .await
            .expect("event within timeout")
            .expect("event channel open")
    }

    #[tokio::test]
    async fn test_announcement_launches_exactly_one_connect() {
        // Arrange
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(server.local_addr().unwrap());
        let other = Endpoint::new("127.0.0.1", 1).unwrap();
        let (coordinator, mut events) = coordinator(Arc::new(ManualClock::new()));

        // Act
        let first = coordinator.handle_discovery(&announcement(&endpoint));
        let second = coordinator.handle_discovery(&announcement(&other));
        let third = coordinator.handle_discovery(&announcement(&endpoint));

        // Assert
        assert!(first);
        assert!(!second);
        assert!(!third);
        assert_eq!(coordinator.active_endpoint(), Some(endpoint.clone()));
        assert_eq!(next(&mut events).await, LinkEvent::Discovered(endpoint.clone()));
        let _peer = server.accept().await.unwrap();
        assert_eq!(next(&mut events).await, LinkEvent::Connected(endpoint));
        assert_eq!(coordinator.active_state(), Some(ChannelState::Active));
        coordinator.stop();
    }

    #[tokio::test]
    async fn test_non_announcements_and_bad_endpoints_are_ignored() {
        let (coordinator, _events) = coordinator(Arc::new(ManualClock::new()));

        assert!(!coordinator.handle_discovery(r#"{"msg":"ping"}"#));
        assert!(!coordinator.handle_discovery(r#"{"msg":"heartbeat"}"#));
        assert!(!coordinator.handle_discovery(r#"{"msg":"hello"}"#));
        assert!(!coordinator.handle_discovery(r#"{"ip":"10.0.0.2","port":""}"#));
        assert!(!coordinator.handle_discovery(r#"{"ip":"","port":"5000"}"#));
        assert!(!coordinator.handle_discovery(r#"{"ip":"10.0.0.2","port":"http"}"#));
        assert!(!coordinator.handle_discovery("not json"));
        assert_eq!(coordinator.active_endpoint(), None);
    }

    #[tokio::test]
    async fn test_create_error_clears_slot_and_allows_retry() {
        // Arrange
        let refused = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            Endpoint::from(listener.local_addr().unwrap())
        };
        let (coordinator, mut events) = coordinator(Arc::new(ManualClock::new()));

        // Act
        assert!(coordinator.handle_discovery(&announcement(&refused)));
        assert_eq!(next(&mut events).await, LinkEvent::Discovered(refused.clone()));
        let failed = next(&mut events).await;

        // Assert
        assert_eq!(
            failed,
            LinkEvent::ConnectionFailed {
                endpoint: refused.clone(),
                failure: ConnectionFailure::CreateError
            }
        );
        assert_eq!(coordinator.active_endpoint(), None);
        assert!(coordinator.handle_discovery(&announcement(&refused)));
        coordinator.stop();
    }

    #[tokio::test]
    async fn test_success_suppresses_and_ping_timeout_resumes_discovery_heartbeat() {
        // Arrange
        let clock = Arc::new(ManualClock::new());
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(server.local_addr().unwrap());
        let (coordinator, mut events) = coordinator(clock.clone());
        coordinator.start().await.expect("start discovery");
        assert!(coordinator.datagram().heartbeat_running());

        // Act – connect
        coordinator.handle_discovery(&announcement(&endpoint));
        let _peer = server.accept().await.unwrap();
        next(&mut events).await;
        assert_eq!(next(&mut events).await, LinkEvent::Connected(endpoint.clone()));

        // Assert – suppressed while connected
        assert!(!coordinator.datagram().heartbeat_running());

        // Act – 16s of silence
        let stream = coordinator.active_stream().expect("active stream");
        clock.advance(Duration::from_secs(16));
        assert_eq!(stream.heartbeat_tick(), Some(Liveness::TimedOut));

        // Assert – failure reported, slot cleared, discovery heartbeat back
        assert_eq!(
            next(&mut events).await,
            LinkEvent::ConnectionFailed {
                endpoint,
                failure: ConnectionFailure::PingTimeout
            }
        );
        assert_eq!(stream.state(), ChannelState::Stopped);
        assert_eq!(coordinator.active_endpoint(), None);
        assert!(coordinator.datagram().heartbeat_running());
        coordinator.stop();
    }

    #[tokio::test]
    async fn test_disconnect_resumes_heartbeat_and_ignores_late_signals() {
        // Arrange
        let clock = Arc::new(ManualClock::new());
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(server.local_addr().unwrap());
        let (coordinator, mut events) = coordinator(clock.clone());
        coordinator.start().await.unwrap();
        coordinator.handle_discovery(&announcement(&endpoint));
        let _peer = server.accept().await.unwrap();
        next(&mut events).await;
        next(&mut events).await;
        let stream = coordinator.active_stream().unwrap();

        // Act
        assert!(coordinator.disconnect());
        clock.advance(Duration::from_secs(16));
        let late = stream.heartbeat_tick();

        // Assert
        assert_eq!(late, None);
        assert!(!coordinator.disconnect());
        assert!(coordinator.datagram().heartbeat_running());
        assert!(events.try_recv().is_err());
        coordinator.stop();
    }

    #[tokio::test]
    async fn test_peer_lines_are_forwarded_except_keepalives() {
        // Arrange
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(server.local_addr().unwrap());
        let (coordinator, mut events) = coordinator(Arc::new(ManualClock::new()));
        coordinator.handle_discovery(&announcement(&endpoint));
        let (mut peer, _) = server.accept().await.unwrap();
        next(&mut events).await;
        next(&mut events).await;

        // Act
        peer.write_all(b"{\"msg\":\"heartbeat\"}\nhello\n").await.unwrap();

        // Assert
        assert_eq!(next(&mut events).await, LinkEvent::PeerMessage("hello".to_string()));
        assert!(coordinator.send_to_peer("reply"));
        coordinator.stop();
        assert!(!coordinator.send_to_peer("late"));
    }

    #[tokio::test]
    async fn test_stop_tears_down_both_channels() {
        let server = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = Endpoint::from(server.local_addr().unwrap());
        let (coordinator, mut events) = coordinator(Arc::new(ManualClock::new()));
        coordinator.start().await.unwrap();
        coordinator.handle_discovery(&announcement(&endpoint));
        let _peer = server.accept().await.unwrap();
        next(&mut events).await;
        next(&mut events).await;
        let stream = coordinator.active_stream().unwrap();

        coordinator.stop();

        assert_eq!(stream.state(), ChannelState::Stopped);
        assert_eq!(coordinator.datagram().state(), ChannelState::Stopped);
        assert_eq!(coordinator.active_endpoint(), None);
    }

    #[tokio::test]
    async fn test_full_event_queue_drops_events_without_blocking() {
        let (coordinator, events) = coordinator(Arc::new(ManualClock::new()));
        for _ in 0..EVENT_CAPACITY + 5 {
            coordinator.emit(LinkEvent::PeerMessage("x".to_string()));
        }
        drop(events);
        coordinator.emit(LinkEvent::PeerMessage("after close".to_string()));
    }
}
