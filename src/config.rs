//! Monitor configuration, fixed at construction time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Everything tunable about the monitor. Immutable once handed to
/// [`Co2Monitor::new`](crate::Co2Monitor::new); build one per monitor
/// instead of mutating process-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Serial line speed. The MH-Z19B only talks 9600 8N1.
    pub baud_rate: u32,
    /// Interval between poll ticks.
    pub poll_interval: Duration,
    /// Per-exchange I/O timeout (write, and whole-frame read).
    pub io_timeout: Duration,
    /// Wait after opening the port before the first exchange; cheap
    /// USB serial adapters need a moment to produce sane bytes.
    pub settle_delay: Duration,
    /// Initial per-channel capacity hint for the reading store.
    pub initial_capacity: usize,
    /// Consecutive failed reconnect attempts before the scheduler gives
    /// up for good. Negative means retry forever.
    pub reconnect_limit: i32,
    /// Start the poll timer as soon as a connect verifies.
    pub auto_start_poll: bool,
    /// Turn the sensor's automatic baseline correction off after
    /// connecting. ABC silently re-zeroes the sensor every 24h, which
    /// ruins long-running indoor measurements.
    pub disable_abc: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            poll_interval: Duration::from_secs(1),
            io_timeout: Duration::from_secs(3),
            settle_delay: Duration::from_secs(2),
            initial_capacity: 512,
            reconnect_limit: 5,
            auto_start_poll: false,
            disable_abc: true,
        }
    }
}

impl MonitorConfig {
    /// Whether `failures` consecutive reconnect failures still leave
    /// another attempt allowed.
    pub(crate) fn may_retry(&self, failures: i32) -> bool {
        self.reconnect_limit < 0 || failures < self.reconnect_limit
    }
}
