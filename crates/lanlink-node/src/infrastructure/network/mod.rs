//! Network infrastructure: the two channels and their collaborators.
//!
//! - [`datagram`] – UDP discovery socket with a slow `heartbeat` keepalive.
//! - [`stream`] – Single TCP connection with a fast `ping` keepalive.
//! - [`broadcast`] – Resolves where discovery datagrams are sent.
//! - [`responder`] – The announcing side: TCP listener plus periodic
//!   endpoint announcements.

pub mod broadcast;
pub mod datagram;
pub mod responder;
pub mod stream;

use std::net::SocketAddr;
use std::time::Duration;

use lanlink_core::{ChannelState, Endpoint, EndpointError};
use thiserror::Error;

/// Error type shared by the datagram and stream channels.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// A socket could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The endpoint host did not resolve to any address.
    #[error("failed to resolve {endpoint}: {source}")]
    Resolve {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connection attempt failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    /// The TCP connection attempt did not complete in time.
    #[error("connection to {endpoint} timed out after {timeout:?}")]
    ConnectTimeout { endpoint: Endpoint, timeout: Duration },

    /// A listener bound to a wildcard address has nothing to announce.
    #[error("listener on {addr} needs an advertised address")]
    NoAdvertisedAddress { addr: SocketAddr },

    /// The announced endpoint is not valid.
    #[error(transparent)]
    InvalidEndpoint(#[from] EndpointError),

    /// The operation is not valid in the channel's current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: ChannelState,
    },
}
