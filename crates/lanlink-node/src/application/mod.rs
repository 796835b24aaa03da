//! Application layer for a LAN-Link node.
//!
//! The application layer decides *what* happens when the channels report
//! something; the channels themselves (in `infrastructure`) only know how to
//! move bytes and keep time.
//!
//! # Sub-modules
//!
//! - **`coordinator`** – Turns discovery announcements into at most one
//!   stream connection, pauses the discovery heartbeat while that connection
//!   is healthy and resumes it when the connection times out.

pub mod coordinator;

pub use coordinator::{ConnectionCoordinator, LinkEvent};
