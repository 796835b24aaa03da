//! Endpoint: the address a stream connection is opened against.
//!
//! An [`Endpoint`] is produced from a peer's announcement and consumed by the
//! stream channel's `connect`.  The host is kept as text because announcements
//! may carry a host name as well as an IP literal; resolution happens at
//! connect time.

use std::fmt;
use std::net::SocketAddr;

use thiserror::Error;

/// Reasons an announcement cannot be turned into an [`Endpoint`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    /// The address field was absent or blank.
    #[error("endpoint address is empty")]
    MissingAddress,
    /// The port field was absent or blank.
    #[error("endpoint port is empty")]
    MissingPort,
    /// The port is not a decimal number in `1..=65535`.
    #[error("invalid endpoint port: {0:?}")]
    InvalidPort(String),
}

/// An immutable (host, port) pair identifying a peer's stream listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Creates an endpoint from a host and a numeric port.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::MissingAddress`] for a blank host and
    /// [`EndpointError::InvalidPort`] for port `0`.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, EndpointError> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err(EndpointError::MissingAddress);
        }
        if port == 0 {
            return Err(EndpointError::InvalidPort(port.to_string()));
        }
        Ok(Self { host, port })
    }

    /// Parses an endpoint from the raw `ip` and `port` strings of an
    /// announcement.
    ///
    /// # Errors
    ///
    /// Returns an [`EndpointError`] describing the first problem found.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use lanlink_core::Endpoint;
    ///
    /// let ep = Endpoint::parse("10.0.0.2", "5000").unwrap();
    /// assert_eq!(ep.to_string(), "10.0.0.2:5000");
    /// ```
    pub fn parse(host: &str, port: &str) -> Result<Self, EndpointError> {
        if host.trim().is_empty() {
            return Err(EndpointError::MissingAddress);
        }
        let port = port.trim();
        if port.is_empty() {
            return Err(EndpointError::MissingPort);
        }
        let port: u16 = port
            .parse()
            .map_err(|_| EndpointError::InvalidPort(port.to_string()))?;
        Self::new(host, port)
    }

    /// Host name or IP literal.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port of the peer's listener.
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
