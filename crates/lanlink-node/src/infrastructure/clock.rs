//! Runtime clock.

use std::time::Instant;

use lanlink_core::Clock;

/// [`Clock`] that reads `tokio::time::Instant`.
///
/// Outside of tests this is the plain monotonic clock.  Under a paused Tokio
/// runtime (`#[tokio::test(start_paused = true)]`) it follows the paused
/// clock, so heartbeat thresholds and heartbeat timers advance together.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}
