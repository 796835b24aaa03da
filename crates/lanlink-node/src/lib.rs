//! lanlink-node library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does a node do?
//!
//! 1. Binds the well-known discovery port and listens for broadcast
//!    datagrams, sending `heartbeat` keepalives while the peer is quiet.
//! 2. When a peer announces its stream endpoint, opens a single TCP
//!    connection to it and supervises it with a faster `ping` heartbeat.
//! 3. While the TCP connection is healthy the broadcast heartbeat is paused;
//!    when the TCP peer goes silent the connection is torn down and the
//!    broadcast heartbeat resumes so the peer can be rediscovered.
//!
//! A node configured as a *responder* additionally accepts those TCP
//! connections and periodically announces its own endpoint.

/// Application layer: the connection coordinator.
pub mod application;

/// Infrastructure layer: sockets, timers, clock and configuration storage.
pub mod infrastructure;

mod sync;
