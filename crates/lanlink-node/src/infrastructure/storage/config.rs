//! TOML-based configuration for a LAN-Link node.
//!
//! Reads and writes `AppConfig` to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\LanLink\config.toml`
//! - Linux:    `~/.config/lanlink/config.toml`
//! - macOS:    `~/Library/Application Support/LanLink/config.toml`
//!
//! Every section and every field is optional; a missing file or an empty
//! file yields the defaults below.
//!
//! ```toml
//! [node]
//! role = "seeker"
//! log_level = "info"
//!
//! [discovery]
//! port = 2425
//! bind_address = "0.0.0.0"
//! broadcast_address = "255.255.255.255"
//! heartbeat_period_ms = 5000
//! keepalive_after_ms = 5000
//! timeout_after_ms = 120000
//!
//! [stream]
//! connect_timeout_ms = 10000
//! heartbeat_period_ms = 2000
//! keepalive_after_ms = 2000
//! timeout_after_ms = 15000
//!
//! [responder]
//! bind_address = "0.0.0.0"
//! port = 8989
//! advertise_address = "192.168.43.1"
//! announce_interval_ms = 3000
//! ```

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use lanlink_core::HeartbeatPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// An address field does not hold a usable IP address.
    #[error("invalid address in `{field}`: {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    /// A timing field is zero, too large, or inconsistent with its section.
    #[error("invalid timing in `{field}`: {reason}")]
    InvalidTiming { field: String, reason: &'static str },
}

/// Upper bound for every `*_ms` field: one day.
pub const MAX_TIMING_MS: u64 = 24 * 60 * 60 * 1000;

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub responder: ResponderConfig,
}

/// Which side of the handoff this node plays.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Listens for announcements and connects to the announced endpoint.
    #[default]
    Seeker,
    /// Announces its endpoint and accepts the connection.
    Responder,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seeker => f.write_str("seeker"),
            Self::Responder => f.write_str("responder"),
        }
    }
}

/// General node behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeConfig {
    #[serde(default)]
    pub role: NodeRole,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Datagram (discovery) channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// UDP port the discovery socket binds.
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    /// UDP port broadcasts are sent to.  Defaults to `port`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_port: Option<u16>,
    /// IP address the discovery socket binds.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Broadcast address used for outbound datagrams.
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    #[serde(default = "default_discovery_period_ms")]
    pub heartbeat_period_ms: u64,
    #[serde(default = "default_discovery_keepalive_ms")]
    pub keepalive_after_ms: u64,
    #[serde(default = "default_discovery_timeout_ms")]
    pub timeout_after_ms: u64,
}

/// Stream (TCP) channel settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_stream_period_ms")]
    pub heartbeat_period_ms: u64,
    #[serde(default = "default_stream_keepalive_ms")]
    pub keepalive_after_ms: u64,
    #[serde(default = "default_stream_timeout_ms")]
    pub timeout_after_ms: u64,
}

/// Responder-side settings; ignored by seekers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponderConfig {
    /// IP address the TCP listener binds.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP listener port; `0` picks an ephemeral port.
    #[serde(default = "default_responder_port")]
    pub port: u16,
    /// Address placed in announcements.  Required when `bind_address` is a
    /// wildcard address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_address: Option<String>,
    #[serde(default = "default_announce_interval_ms")]
    pub announce_interval_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_discovery_port() -> u16 {
    2425
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}
fn default_discovery_period_ms() -> u64 {
    HeartbeatPolicy::DATAGRAM.period.as_millis() as u64
}
fn default_discovery_keepalive_ms() -> u64 {
    HeartbeatPolicy::DATAGRAM.keepalive_after.as_millis() as u64
}
fn default_discovery_timeout_ms() -> u64 {
    HeartbeatPolicy::DATAGRAM.timeout_after.as_millis() as u64
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_stream_period_ms() -> u64 {
    HeartbeatPolicy::STREAM.period.as_millis() as u64
}
fn default_stream_keepalive_ms() -> u64 {
    HeartbeatPolicy::STREAM.keepalive_after.as_millis() as u64
}
fn default_stream_timeout_ms() -> u64 {
    HeartbeatPolicy::STREAM.timeout_after.as_millis() as u64
}
fn default_responder_port() -> u16 {
    8989
}
fn default_announce_interval_ms() -> u64 {
    3_000
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            role: NodeRole::default(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            port: default_discovery_port(),
            broadcast_port: None,
            bind_address: default_bind_address(),
            broadcast_address: default_broadcast_address(),
            heartbeat_period_ms: default_discovery_period_ms(),
            keepalive_after_ms: default_discovery_keepalive_ms(),
            timeout_after_ms: default_discovery_timeout_ms(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_period_ms: default_stream_period_ms(),
            keepalive_after_ms: default_stream_keepalive_ms(),
            timeout_after_ms: default_stream_timeout_ms(),
        }
    }
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_responder_port(),
            advertise_address: None,
            announce_interval_ms: default_announce_interval_ms(),
        }
    }
}

// ── Derived runtime values ────────────────────────────────────────────────────

impl DiscoveryConfig {
    /// Socket address the discovery socket binds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind_address` is not an IP.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(
            parse_ip("discovery.bind_address", &self.bind_address)?,
            self.port,
        ))
    }

    /// Port outbound broadcasts are addressed to.
    pub fn target_port(&self) -> u16 {
        self.broadcast_port.unwrap_or(self.port)
    }

    /// The configured broadcast address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if it is not an IP.
    pub fn broadcast_ip(&self) -> Result<IpAddr, ConfigError> {
        parse_ip("discovery.broadcast_address", &self.broadcast_address)
    }

    /// Heartbeat thresholds for the discovery channel.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTiming`] for a zero period, a value above
    /// [`MAX_TIMING_MS`], or a keepalive threshold beyond the timeout.
    pub fn heartbeat_policy(&self) -> Result<HeartbeatPolicy, ConfigError> {
        policy(
            "discovery",
            self.heartbeat_period_ms,
            self.keepalive_after_ms,
            self.timeout_after_ms,
        )
    }
}

impl StreamConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTiming`] if the timeout is zero or above
    /// [`MAX_TIMING_MS`].
    pub fn connect_timeout(&self) -> Result<Duration, ConfigError> {
        timing_ms("stream.connect_timeout_ms".to_string(), self.connect_timeout_ms, 1)
    }

    /// Heartbeat thresholds for the stream channel.
    ///
    /// # Errors
    ///
    /// Same rules as [`DiscoveryConfig::heartbeat_policy`].
    pub fn heartbeat_policy(&self) -> Result<HeartbeatPolicy, ConfigError> {
        policy(
            "stream",
            self.heartbeat_period_ms,
            self.keepalive_after_ms,
            self.timeout_after_ms,
        )
    }
}

impl ResponderConfig {
    /// Socket address the TCP listener binds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `bind_address` is not an IP.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(
            parse_ip("responder.bind_address", &self.bind_address)?,
            self.port,
        ))
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidTiming`] if the interval is zero or above
    /// [`MAX_TIMING_MS`].
    pub fn announce_interval(&self) -> Result<Duration, ConfigError> {
        timing_ms(
            "responder.announce_interval_ms".to_string(),
            self.announce_interval_ms,
            1,
        )
    }
}

fn policy(
    section: &str,
    period_ms: u64,
    keepalive_ms: u64,
    timeout_ms: u64,
) -> Result<HeartbeatPolicy, ConfigError> {
    let policy = HeartbeatPolicy {
        period: timing_ms(format!("{section}.heartbeat_period_ms"), period_ms, 1)?,
        keepalive_after: timing_ms(format!("{section}.keepalive_after_ms"), keepalive_ms, 0)?,
        timeout_after: timing_ms(format!("{section}.timeout_after_ms"), timeout_ms, 0)?,
    };
    if policy.keepalive_after > policy.timeout_after {
        return Err(ConfigError::InvalidTiming {
            field: format!("{section}.keepalive_after_ms"),
            reason: "must not exceed timeout_after_ms",
        });
    }
    Ok(policy)
}

fn timing_ms(field: String, value: u64, min: u64) -> Result<Duration, ConfigError> {
    if value < min {
        return Err(ConfigError::InvalidTiming {
            field,
            reason: "must be greater than zero",
        });
    }
    if value > MAX_TIMING_MS {
        return Err(ConfigError::InvalidTiming {
            field,
            reason: "must not exceed one day",
        });
    }
    Ok(Duration::from_millis(value))
}

fn parse_ip(field: &'static str, value: &str) -> Result<IpAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddress {
            field,
            value: value.to_string(),
        })
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the platform config file, returning
/// `AppConfig::default()` if the file does not yet exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Loads `AppConfig` from `path`, returning defaults if it does not exist.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Loads `AppConfig` from a file named explicitly by the operator.
///
/// # Errors
///
/// Unlike [`load_config_from`], a missing file is reported as
/// [`ConfigError::Io`].  Malformed TOML yields [`ConfigError::Parse`].
pub fn load_config_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Persists `config` to the platform config file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &config_file_path()?)
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Same as [`save_config`].
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves the platform config base directory including the `LanLink` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LanLink"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("lanlink"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LanLink")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
