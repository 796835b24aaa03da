//! Heartbeat thresholds.
//!
//! Every heartbeat tick measures `elapsed = now - last_activity` and asks the
//! channel's [`HeartbeatPolicy`] for a [`Liveness`] verdict.  Both comparisons
//! are strict: a peer heard from exactly `keepalive_after` ago is still quiet,
//! and one heard from exactly `timeout_after` ago has not timed out yet.

use std::time::Duration;

/// Verdict of a single heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Data arrived recently; nothing to do.
    Quiet,
    /// Keepalive threshold crossed; send a keepalive.
    Overdue,
    /// Timeout threshold crossed; the peer is considered gone.
    TimedOut,
}

/// Timing rules for one channel's heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPolicy {
    /// Interval between ticks.
    pub period: Duration,
    /// Silence after which a keepalive is sent.
    pub keepalive_after: Duration,
    /// Silence after which the peer is considered gone.
    pub timeout_after: Duration,
}

impl HeartbeatPolicy {
    /// Datagram channel: tick every 5s, keepalive after 5s, offline after 120s.
    pub const DATAGRAM: Self = Self {
        period: Duration::from_secs(5),
        keepalive_after: Duration::from_secs(5),
        timeout_after: Duration::from_secs(120),
    };

    /// Stream channel: tick every 2s, ping after 2s, fail after 15s.
    pub const STREAM: Self = Self {
        period: Duration::from_secs(2),
        keepalive_after: Duration::from_secs(2),
        timeout_after: Duration::from_secs(15),
    };

    /// Classifies `elapsed` silence.
    pub fn assess(&self, elapsed: Duration) -> Liveness {
        if elapsed > self.timeout_after {
            Liveness::TimedOut
        } else if elapsed > self.keepalive_after {
            Liveness::Overdue
        } else {
            Liveness::Quiet
        }
    }
}
