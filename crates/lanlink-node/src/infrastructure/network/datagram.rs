//! UDP discovery channel.
//!
//! The channel binds the well-known discovery port with broadcast enabled,
//! hands every decodable inbound datagram to its subscribers, and runs a slow
//! heartbeat:
//!
//! | silence `d`            | action                                      |
//! |------------------------|---------------------------------------------|
//! | `d <= 5s`              | nothing (back to `Active` if `Degraded`)    |
//! | `5s < d <= 120s`       | broadcast `{"msg":"heartbeat"}`, `Degraded` |
//! | `d > 120s`             | peer offline: log, count, reset timestamp   |
//!
//! The channel never stops itself on a heartbeat timeout; only a transport
//! read failure or an explicit [`DatagramChannel::stop`] ends it.
//!
//! While a stream connection is healthy the coordinator pauses the heartbeat
//! with [`DatagramChannel::suppress_heartbeat`]; the socket stays open and
//! inbound datagrams keep flowing to subscribers.

use std::net::{Ipv4Addr, SocketAddr};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

use lanlink_core::{ChannelState, Clock, DiscoveryMessage, HeartbeatPolicy, Liveness};
use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::broadcast::BroadcastResolver;
use super::ChannelError;
use crate::infrastructure::heartbeat::HeartbeatScheduler;
use crate::infrastructure::storage::config::{ConfigError, DiscoveryConfig};
use crate::sync::{lock, read, write};

/// Largest datagram the receive loop accepts.
const MAX_DATAGRAM: usize = 64 * 1024;

/// Receives the text of every decodable inbound datagram.
///
/// Returning an error only logs it; later listeners still run.
pub trait MessageListener: Send + Sync {
    fn on_message_received(&self, text: &str) -> anyhow::Result<()>;
}

impl<F> MessageListener for F
where
    F: Fn(&str) -> anyhow::Result<()> + Send + Sync,
{
    fn on_message_received(&self, text: &str) -> anyhow::Result<()> {
        self(text)
    }
}

/// Socket and timing parameters for a [`DatagramChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatagramSettings {
    /// Address the discovery socket binds.
    pub bind_addr: SocketAddr,
    /// Port outbound datagrams are sent to.
    pub broadcast_port: u16,
    pub policy: HeartbeatPolicy,
}

impl DatagramSettings {
    /// Default discovery port.
    pub const DISCOVERY_PORT: u16 = 2425;

    /// Builds settings from the `[discovery]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind_address` is not an IP,
    /// or [`ConfigError::InvalidTiming`] for out-of-range heartbeat values.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            bind_addr: config.bind_addr()?,
            broadcast_port: config.target_port(),
            policy: config.heartbeat_policy()?,
        })
    }
}

impl Default for DatagramSettings {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), Self::DISCOVERY_PORT),
            broadcast_port: Self::DISCOVERY_PORT,
            policy: HeartbeatPolicy::DATAGRAM,
        }
    }
}

/// The broadcast discovery channel.
pub struct DatagramChannel {
    settings: DatagramSettings,
    resolver: Arc<dyn BroadcastResolver>,
    clock: Arc<dyn Clock>,
    state: Mutex<ChannelState>,
    last_activity: Mutex<Instant>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    receiver: Mutex<Option<JoinHandle<()>>>,
    listeners: RwLock<Vec<Arc<dyn MessageListener>>>,
    heartbeat: HeartbeatScheduler,
    offline_detections: AtomicU64,
}

impl DatagramChannel {
    /// Creates an idle channel.  Nothing is bound until [`start`](Self::start).
    pub fn new(
        settings: DatagramSettings,
        resolver: Arc<dyn BroadcastResolver>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Self>| {
            let me = me.clone();
            let heartbeat = HeartbeatScheduler::with_callback(
                "discovery",
                Arc::new(move || {
                    if let Some(channel) = me.upgrade() {
                        channel.heartbeat_tick();
                    }
                }),
            );
            let now = clock.now();
            Self {
                settings,
                resolver,
                clock,
                state: Mutex::new(ChannelState::Idle),
                last_activity: Mutex::new(now),
                socket: Mutex::new(None),
                receiver: Mutex::new(None),
                listeners: RwLock::new(Vec::new()),
                heartbeat,
                offline_detections: AtomicU64::new(0),
            }
        })
    }

    /// Binds the discovery socket, then starts the receive loop and the
    /// heartbeat.  Returns the bound address.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::InvalidState`] if the channel is not `Idle`.
    /// - [`ChannelError::Bind`] if the socket cannot be bound; the channel
    ///   returns to `Idle`.
    pub async fn start(self: &Arc<Self>) -> Result<SocketAddr, ChannelError> {
        transition(&self.state, "start", ChannelState::Idle, ChannelState::Starting)?;

        let addr = self.settings.bind_addr;
        let socket = match bind_broadcast(addr).await {
            Ok(socket) => Arc::new(socket),
            Err(source) => {
                let _ = transition(&self.state, "start", ChannelState::Starting, ChannelState::Idle);
                return Err(ChannelError::Bind { addr, source });
            }
        };
        let local_addr = socket.local_addr().unwrap_or(addr);

        {
            let mut state = lock(&self.state);
            if *state != ChannelState::Starting {
                // Stopped while binding; the fresh socket is dropped here.
                return Err(ChannelError::InvalidState {
                    operation: "start",
                    state: *state,
                });
            }
            *lock(&self.last_activity) = self.clock.now();
            *lock(&self.socket) = Some(Arc::clone(&socket));
            *lock(&self.receiver) = Some(tokio::spawn(receive_loop(Arc::downgrade(self), socket)));
            *state = ChannelState::Active;
            self.heartbeat.start(Duration::ZERO, self.settings.policy.period);
        }

        info!("discovery channel listening on UDP {local_addr}");
        Ok(local_addr)
    }

    /// Registers a listener for inbound messages.  Listeners run in
    /// registration order.
    pub fn subscribe<L: MessageListener + 'static>(&self, listener: L) {
        write(&self.listeners).push(Arc::new(listener));
    }

    /// Broadcasts `payload` on a background task.
    ///
    /// The broadcast address is resolved again for every send.  Failures are
    /// logged; the channel state is never affected.
    pub fn send(&self, payload: impl Into<String>) {
        let payload = payload.into();
        let socket = {
            let state = lock(&self.state);
            match lock(&self.socket).clone() {
                Some(socket) if state.is_running() => socket,
                _ => {
                    warn!("discovery send while {}; dropped: {payload}", *state);
                    return;
                }
            }
        };
        let Ok(handle) = Handle::try_current() else {
            warn!("discovery send outside a Tokio runtime; dropped: {payload}");
            return;
        };

        let resolver = Arc::clone(&self.resolver);
        let port = self.settings.broadcast_port;
        handle.spawn(async move {
            let Some(ip) = resolver.resolve_broadcast_address() else {
                warn!("no broadcast address available; dropped: {payload}");
                return;
            };
            let target = SocketAddr::new(ip, port);
            match socket.send_to(payload.as_bytes(), target).await {
                Ok(_) => debug!("discovery -> {target}: {payload}"),
                Err(e) => warn!("discovery send to {target} failed: {e}"),
            }
        });
    }

    /// Broadcasts an encoded [`DiscoveryMessage`].
    pub fn send_message(&self, message: &DiscoveryMessage) {
        self.send(message.encode());
    }

    /// Cancels the heartbeat, ends the receive loop and releases the socket.
    /// Idempotent.
    pub fn stop(&self) {
        let previous = {
            let mut state = lock(&self.state);
            if state.is_terminal() {
                return;
            }
            let previous = *state;
            *state = ChannelState::Stopped;
            self.heartbeat.stop();
            if let Some(receiver) = lock(&self.receiver).take() {
                receiver.abort();
            }
            lock(&self.socket).take();
            previous
        };
        info!("discovery channel stopped (was {previous})");
    }

    /// Pauses the heartbeat without touching the socket.
    pub fn suppress_heartbeat(&self) {
        self.heartbeat.stop();
        debug!("discovery heartbeat suppressed");
    }

    /// Restarts the heartbeat with an immediate first tick.  Returns `false`
    /// when the channel is not running.
    pub fn resume_heartbeat(&self) -> bool {
        let state = lock(&self.state);
        if !state.is_running() {
            debug!("discovery heartbeat not resumed: channel {}", *state);
            return false;
        }
        self.heartbeat.start(Duration::ZERO, self.settings.policy.period);
        debug!("discovery heartbeat resumed");
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
            let now = self.clock.now();
            let mut last = lock(&self.last_activity);
            let verdict = self.settings.policy.assess(now.saturating_duration_since(*last));
            match verdict {
                Liveness::TimedOut => {
                    if now > *last {
                        *last = now;
                    }
                }
                Liveness::Overdue => *state = ChannelState::Degraded,
                Liveness::Quiet => {
                    if *state == ChannelState::Degraded {
                        *state = ChannelState::Active;
                    }
                }
            }
            verdict
        };

        match verdict {
            Liveness::TimedOut => {
                let n = self.offline_detections.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    "discovery peer silent for over {:?}; considered offline (#{n})",
                    self.settings.policy.timeout_after
                );
            }
            Liveness::Overdue => self.send_message(&DiscoveryMessage::Heartbeat),
            Liveness::Quiet => {}
        }
        Some(verdict)
    }

    pub fn state(&self) -> ChannelState {
        *lock(&self.state)
    }

    pub fn heartbeat_running(&self) -> bool {
        self.heartbeat.is_running()
    }

    /// Bound address while the socket is open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        lock(&self.socket).as_ref().and_then(|s| s.local_addr().ok())
    }

    /// How many times the heartbeat has declared the peer offline.
    pub fn offline_detections(&self) -> u64 {
        self.offline_detections.load(Ordering::Relaxed)
    }

    /// Clock reading of the most recent inbound datagram (or of the last
    /// offline reset).
    pub fn last_activity(&self) -> Instant {
        *lock(&self.last_activity)
    }

    pub fn settings(&self) -> &DatagramSettings {
        &self.settings
    }

    fn record_activity(&self) {
        let now = self.clock.now();
        let mut state = lock(&self.state);
        if *state == ChannelState::Degraded {
            *state = ChannelState::Active;
        }
        let mut last = lock(&self.last_activity);
        if now > *last {
            *last = now;
        }
    }

    fn handle_datagram(&self, bytes: &[u8], src: SocketAddr) {
        self.record_activity();

        let text = match std::str::from_utf8(bytes) {
            Ok(text) => text.trim(),
            Err(e) => {
                debug!("discovery datagram from {src} is not UTF-8: {e}");
                return;
            }
        };
        match DiscoveryMessage::decode(text) {
            Ok(message) => {
                debug!("discovery <- {src}: {}", message.kind_name());
                self.dispatch(text);
            }
            Err(e) => debug!("undecodable discovery datagram from {src}: {e}"),
        }
    }

    fn dispatch(&self, text: &str) {
        let listeners = read(&self.listeners).clone();
        for listener in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_message_received(text))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("discovery listener failed: {e:#}"),
                Err(_) => error!("discovery listener panicked"),
            }
        }
    }
}

impl Drop for DatagramChannel {
    fn drop(&mut self) {
        if let Some(receiver) = lock(&self.receiver).take() {
            receiver.abort();
        }
    }
}

impl std::fmt::Debug for DatagramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramChannel")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Moves `state` from `from` to `to`, or reports the state it was found in.
fn transition(
    state: &Mutex<ChannelState>,
    operation: &'static str,
    from: ChannelState,
    to: ChannelState,
) -> Result<(), ChannelError> {
    let mut state = lock(state);
    if *state != from {
        return Err(ChannelError::InvalidState {
            operation,
            state: *state,
        });
    }
    *state = to;
    Ok(())
}

async fn bind_broadcast(addr: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(addr).await?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

async fn receive_loop(channel: Weak<DatagramChannel>, socket: Arc<UdpSocket>) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let result = socket.recv_from(&mut buf).await;
        let Some(channel) = channel.upgrade() else {
            break;
        };
        match result {
            Ok((len, src)) => channel.handle_datagram(&buf[..len], src),
            Err(e) => {
                if !channel.state().is_terminal() {
                    error!("discovery recv failed: {e}; stopping channel");
                    channel.stop();
                }
                break;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
