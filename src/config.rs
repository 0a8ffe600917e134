//! Pipeline Configuration
//!
//! Timer cadence and channel sizing for purchases.

use std::time::Duration;

/// Default status poll cadence.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Default countdown refresh cadence.
pub const DEFAULT_COUNTDOWN_INTERVAL: Duration = Duration::from_secs(1);

/// Default reveal event channel capacity.
pub const DEFAULT_EVENT_BUFFER: usize = 16;

/// Settings shared by every purchase an orchestrator runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Time between payment status fetches.
    pub poll_interval: Duration,
    /// Time between countdown updates.
    pub countdown_interval: Duration,
    /// Capacity of each purchase's reveal event channel.
    pub event_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            countdown_interval: DEFAULT_COUNTDOWN_INTERVAL,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl PipelineConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// Zero or unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let positive = |key: &str| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
        };

        Self {
            poll_interval: positive("LOOTBOX_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            countdown_interval: positive("LOOTBOX_COUNTDOWN_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.countdown_interval),
            event_buffer: positive("LOOTBOX_EVENT_BUFFER")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(defaults.event_buffer),
        }
    }
}
