//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the TOML configuration from the
//! platform-appropriate directory (or an explicit path), supplies defaults
//! when the file does not exist yet, and derives the runtime values
//! (socket addresses, heartbeat policies) the network layer consumes.

pub mod config;
