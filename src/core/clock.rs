//! Wall Clock
//!
//! All pipeline timestamps are absolute (`DateTime<Utc>`), so the poller
//! and the countdown display agree on what "now" means.

use chrono::{DateTime, Utc};

/// Source of absolute timestamps.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock advanced by tokio's monotonic clock.
///
/// Anchored to a fixed wall time at construction. Under a paused tokio
/// runtime it moves only when tokio time advances, which makes deadline
/// arithmetic exact in tests.
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor: DateTime<Utc>,
    origin: tokio::time::Instant,
}

impl TokioClock {
    /// Anchor at the current system time.
    pub fn new() -> Self {
        Self::anchored_at(Utc::now())
    }

    /// Anchor at a given wall time.
    pub fn anchored_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            origin: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.origin.elapsed();
        match chrono::Duration::from_std(elapsed) {
            Ok(delta) => self.anchor + delta,
            Err(_) => self.anchor,
        }
    }
}
