//! Channel lifecycle states and stream failure kinds.
//!
//! ```text
//! Idle ──► Starting ──► Active ◄──► Degraded
//!                          │            │
//!                          └──► Stopped ◄┘
//! ```
//!
//! `Stopped` is terminal: a stopped channel is never restarted, a new one is
//! constructed instead.

use std::fmt;

/// Lifecycle state of a datagram or stream channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// No socket open yet.
    Idle,
    /// Bind or connect in flight.
    Starting,
    /// Socket open, heartbeat running, peer heard from recently.
    Active,
    /// Keepalive threshold crossed; keepalives are being sent.
    Degraded,
    /// Socket released, heartbeat cancelled.  Terminal.
    Stopped,
}

impl ChannelState {
    /// `true` while the channel has an open socket and a live heartbeat.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Active | Self::Degraded)
    }

    /// `true` once the channel can no longer be used.
    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
            Self::Degraded => "degraded",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Why a stream connection was lost or never established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionFailure {
    /// The connection attempt failed.
    CreateError,
    /// The peer stayed silent past the stream timeout.
    PingTimeout,
}

impl ConnectionFailure {
    /// Numeric code reported to applications.
    pub fn code(self) -> u8 {
        match self {
            Self::CreateError => 1,
            Self::PingTimeout => 2,
        }
    }
}

impl fmt::Display for ConnectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateError => f.write_str("CREATE_ERROR"),
            Self::PingTimeout => f.write_str("PING_TIMEOUT"),
        }
    }
}
