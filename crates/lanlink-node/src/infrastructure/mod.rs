//! Infrastructure layer for a LAN-Link node.
//!
//! Contains the OS-facing adapters: UDP and TCP sockets, the heartbeat
//! timer, the runtime clock, and configuration file storage.
//!
//! # Sub-modules
//!
//! - **`clock`** – [`lanlink_core::Clock`] backed by the Tokio clock.
//! - **`heartbeat`** – Restartable periodic timer shared by both channels.
//! - **`network`** – Datagram (discovery) channel, stream channel, broadcast
//!   address resolution and the responder side of the handoff.
//! - **`storage`** – TOML configuration.

pub mod clock;
pub mod heartbeat;
pub mod network;
pub mod storage;
