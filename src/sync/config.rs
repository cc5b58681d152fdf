/*!
 * Synchronization Configuration
 *
 * Runtime tuning for the queued synchronizer
 */

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Synchronizer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Residual timeouts at or below this are spun out instead of parked
    pub spin_for_timeout_threshold: Duration,
    /// Refuse barging while other threads are queued (for strategies that honour it)
    pub fair: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            spin_for_timeout_threshold: Duration::from_nanos(1000),
            fair: false,
        }
    }
}

impl SyncConfig {
    /// Configuration optimized for low-latency (sub-10µs residual waits are spun)
    pub const fn low_latency() -> Self {
        Self {
            spin_for_timeout_threshold: Duration::from_micros(10),
            fair: false,
        }
    }

    /// Configuration optimized for long waits (park whenever possible)
    pub const fn long_wait() -> Self {
        Self {
            spin_for_timeout_threshold: Duration::from_nanos(100),
            fair: false,
        }
    }

    /// Same tuning with the fairness policy switched on or off
    pub const fn with_fairness(mut self, fair: bool) -> Self {
        self.fair = fair;
        self
    }

    /// Whether a remaining wait is long enough to be worth parking for
    #[inline]
    pub(crate) fn should_park_for(&self, remaining: Duration) -> bool {
        remaining > self.spin_for_timeout_threshold
    }
}
