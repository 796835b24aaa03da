//! # lanlink-core
//!
//! Shared library for LAN-Link containing the discovery wire format, the
//! peer [`Endpoint`] type, per-channel lifecycle states and the heartbeat
//! liveness rules used by both the datagram and the stream channel.
//!
//! This crate performs no I/O.  It has no dependency on sockets, timers or an
//! async runtime, so everything in it can be unit-tested in isolation.
//!
//! # Architecture overview
//!
//! LAN-Link pairs two devices on the same network segment.  Devices broadcast
//! small key-value datagrams to find each other; once one side learns the
//! other's stream endpoint it opens a TCP connection.  Both channels watch
//! their peer with a heartbeat: if nothing arrives for too long the peer is
//! considered gone.
//!
//! - **`protocol`** – The single-line JSON encoding of [`DiscoveryMessage`]s.
//! - **`domain`** – [`Endpoint`], [`ChannelState`], [`ConnectionFailure`] and
//!   the [`HeartbeatPolicy`] that turns "time since last data" into a verdict.
//! - **`clock`** – The monotonic [`Clock`] seam plus a [`ManualClock`] for tests.

pub mod clock;
pub mod domain;
pub mod protocol;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use domain::endpoint::{Endpoint, EndpointError};
pub use domain::liveness::{HeartbeatPolicy, Liveness};
pub use domain::state::{ChannelState, ConnectionFailure};
pub use protocol::message::{DiscoveryMessage, ProtocolError};
