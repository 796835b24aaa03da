//! The announcing side of a LAN-Link pair.
//!
//! A [`PeerResponder`] owns a TCP listener that seekers connect to.  Every
//! accepted connection is served on its own task: `ping` lines are answered
//! with a `heartbeat` line so the seeker's stream heartbeat stays quiet, and
//! anything else is logged and ignored.
//!
//! Announcements reuse the node's [`DatagramChannel`]: a dedicated
//! [`HeartbeatScheduler`] broadcasts `{"ip":..,"port":..}` every announce
//! interval until [`PeerResponder::stop`] is called.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lanlink_core::{DiscoveryMessage, Endpoint};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time;
use tracing::{debug, info, warn};

use super::datagram::DatagramChannel;
use super::ChannelError;
use crate::infrastructure::heartbeat::{HeartbeatError, HeartbeatScheduler};
use crate::infrastructure::storage::config::{ConfigError, ResponderConfig};
use crate::sync::lock;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Listener and announcement parameters for a [`PeerResponder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderSettings {
    pub listen_addr: SocketAddr,
    /// Host placed in announcements.  Defaults to the listener's IP, which
    /// must then not be a wildcard address.
    pub advertise_host: Option<String>,
    pub announce_interval: Duration,
}

impl ResponderSettings {
    /// Builds settings from the `[responder]` config section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind_address` is not an IP,
    /// or [`ConfigError::InvalidTiming`] for an out-of-range interval.
    pub fn from_config(config: &ResponderConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            listen_addr: config.bind_addr()?,
            advertise_host: config.advertise_address.clone(),
            announce_interval: config.announce_interval()?,
        })
    }
}

impl Default for ResponderSettings {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8989)),
            advertise_host: None,
            announce_interval: Duration::from_secs(3),
        }
    }
}

/// TCP listener plus periodic endpoint announcements.
pub struct PeerResponder {
    local_addr: SocketAddr,
    advertised: Endpoint,
    announce_interval: Duration,
    accept_task: Mutex<Option<JoinHandle<()>>>,
    announcer: HeartbeatScheduler,
}

impl PeerResponder {
    /// Binds the listener and starts accepting connections.
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Bind`] if the listener cannot be bound.
    /// - [`ChannelError::NoAdvertisedAddress`] if the listener is bound to a
    ///   wildcard address and no advertised host is configured.
    /// - [`ChannelError::InvalidEndpoint`] if the advertised host is blank.
    pub async fn bind(settings: ResponderSettings) -> Result<Arc<Self>, ChannelError> {
        let addr = settings.listen_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ChannelError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ChannelError::Bind { addr, source })?;

        let advertised = match settings.advertise_host {
            Some(host) => Endpoint::new(host, local_addr.port())?,
            None if local_addr.ip().is_unspecified() => {
                return Err(ChannelError::NoAdvertisedAddress { addr: local_addr });
            }
            None => Endpoint::from(local_addr),
        };

        info!("responder listening on TCP {local_addr}, advertising {advertised}");
        Ok(Arc::new(Self {
            local_addr,
            advertised,
            announce_interval: settings.announce_interval,
            accept_task: Mutex::new(Some(tokio::spawn(accept_loop(listener)))),
            announcer: HeartbeatScheduler::new("announce"),
        }))
    }

    /// Broadcasts this responder's endpoint through `datagram` now and then
    /// every announce interval.  Replaces any previous announcement schedule.
    ///
    /// # Errors
    ///
    /// Propagates [`HeartbeatError`] from installing the announce callback.
    pub fn start_announcing(&self, datagram: &Arc<DatagramChannel>) -> Result<(), HeartbeatError> {
        let channel = Arc::downgrade(datagram);
        let payload = DiscoveryMessage::announce(&self.advertised).encode();
        self.announcer.stop();
        self.announcer.set_callback(Arc::new(move || {
            if let Some(channel) = channel.upgrade() {
                channel.send(payload.clone());
            }
        }))?;
        self.announcer.start(Duration::ZERO, self.announce_interval);
        debug!("announcing {} every {:?}", self.advertised, self.announce_interval);
        Ok(())
    }

    pub fn stop_announcing(&self) {
        self.announcer.stop();
    }

    /// Stops announcing, closes the listener and drops every served peer.
    pub fn stop(&self) {
        self.announcer.stop();
        if let Some(task) = lock(&self.accept_task).take() {
            task.abort();
            info!("responder on {} stopped", self.local_addr);
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The endpoint placed in announcements.
    pub fn advertised_endpoint(&self) -> &Endpoint {
        &self.advertised
    }

    pub fn is_announcing(&self) -> bool {
        self.announcer.is_running()
    }
}

impl Drop for PeerResponder {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PeerResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerResponder")
            .field("local_addr", &self.local_addr)
            .field("advertised", &self.advertised)
            .finish_non_exhaustive()
    }
}

/// Accepts seekers until aborted.  Aborting drops the [`JoinSet`], which
/// aborts every peer session with it.
async fn accept_loop(listener: TcpListener) {
    let mut sessions = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    info!("responder accepted {peer}");
                    sessions.spawn(handle_peer(stream, peer));
                }
                Err(e) => {
                    warn!("responder accept error: {e}");
                    time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
        }
    }
}

async fn handle_peer(stream: TcpStream, peer: SocketAddr) {
    match serve_peer(stream, peer).await {
        Ok(()) => info!("peer {peer} disconnected"),
        Err(e) => warn!("peer {peer} session ended with error: {e:#}"),
    }
}

async fn serve_peer(stream: TcpStream, peer: SocketAddr) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let reply = format!("{}\n", DiscoveryMessage::Heartbeat.encode());

    while let Some(line) = lines.next_line().await? {
        match DiscoveryMessage::decode(&line) {
            Ok(DiscoveryMessage::Ping) => {
                write_half.write_all(reply.as_bytes()).await?;
            }
            Ok(other) => debug!("peer {peer} sent {}", other.kind_name()),
            Err(_) => debug!("peer {peer} sent {line:?}"),
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
