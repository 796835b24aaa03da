//! Broadcast address resolution.
//!
//! Which address reaches every peer depends on the active network interface.
//! The datagram channel asks a [`BroadcastResolver`] before every send so a
//! changed interface is picked up without restarting the channel.

use std::net::{IpAddr, Ipv4Addr};

use crate::infrastructure::storage::config::{ConfigError, DiscoveryConfig};

/// Resolves the broadcast address for the active network interface.
#[cfg_attr(test, mockall::automock)]
pub trait BroadcastResolver: Send + Sync {
    /// Returns the address to send discovery datagrams to, or `None` when no
    /// interface is usable right now.
    fn resolve_broadcast_address(&self) -> Option<IpAddr>;
}

/// Resolver that always returns one configured address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticBroadcastResolver {
    address: IpAddr,
}

impl StaticBroadcastResolver {
    pub fn new(address: IpAddr) -> Self {
        Self { address }
    }

    /// The limited broadcast address `255.255.255.255`.
    pub fn limited() -> Self {
        Self::new(IpAddr::V4(Ipv4Addr::BROADCAST))
    }

    /// Uses `discovery.broadcast_address` from the config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if the address does not parse.
    pub fn from_config(config: &DiscoveryConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.broadcast_ip()?))
    }
}

impl Default for StaticBroadcastResolver {
    fn default() -> Self {
        Self::limited()
    }
}

impl BroadcastResolver for StaticBroadcastResolver {
    fn resolve_broadcast_address(&self) -> Option<IpAddr> {
        Some(self.address)
    }
}
