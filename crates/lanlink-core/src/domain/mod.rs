//! Domain types for LAN-Link.
//!
//! Pure data and decision rules with no infrastructure dependencies.  The
//! network layer in `lanlink-node` owns sockets and timers; it asks these
//! types what to do.

/// Where a stream connection should be opened.
pub mod endpoint;

/// Heartbeat thresholds and the verdict they produce.
pub mod liveness;

/// Channel lifecycle states and connection failure kinds.
pub mod state;
