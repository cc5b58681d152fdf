/*!
 * Counting Semaphore
 * State holds the number of available permits
 */

use crate::errors::{SyncError, SyncResult};
use crate::sync::{Strategy, SyncConfig, Synchronizer};
use std::time::Duration;

/// Shared hooks for [`Semaphore`]
#[derive(Debug, Default)]
pub struct SemaphoreStrategy {
    fair: bool,
}

impl SemaphoreStrategy {
    fn barging_try_acquire(sync: &Synchronizer<Self>, acquires: i64) -> i64 {
        loop {
            let available = sync.state();
            // A deficit too deep to represent is still a failed attempt
            let Some(remaining) = available.checked_sub(acquires) else {
                return -1;
            };
            if remaining < 0 || sync.compare_and_set_state(available, remaining) {
                return remaining;
            }
        }
    }
}

impl Strategy for SemaphoreStrategy {
    fn try_acquire_shared(&self, sync: &Synchronizer<Self>, acquires: i64) -> SyncResult<i64> {
        if self.fair && sync.has_queued_predecessors() {
            return Ok(-1);
        }
        Ok(Self::barging_try_acquire(sync, acquires))
    }

    fn try_release_shared(&self, sync: &Synchronizer<Self>, releases: i64) -> SyncResult<bool> {
        loop {
            let current = sync.state();
            let next = current
                .checked_add(releases)
                .ok_or_else(|| SyncError::illegal_monitor_state("maximum permit count exceeded"))?;
            if sync.compare_and_set_state(current, next) {
                return Ok(true);
            }
        }
    }
}

/// Counting semaphore
///
/// Permits are not owned: any thread may release, including one that never
/// acquired. The initial count may be negative, in which case releases must
/// happen before anyone acquires.
#[derive(Debug)]
pub struct Semaphore {
    sync: Synchronizer<SemaphoreStrategy>,
}

impl Semaphore {
    /// Non-fair semaphore with `permits` initial permits
    pub fn new(permits: i64) -> Self {
        Self::with_config(permits, SyncConfig::default())
    }

    pub fn with_fairness(permits: i64, fair: bool) -> Self {
        Self::with_config(permits, SyncConfig::default().with_fairness(fair))
    }

    /// Semaphore honouring `config.fair`
    pub fn with_config(permits: i64, config: SyncConfig) -> Self {
        let sync = Synchronizer::with_config(SemaphoreStrategy { fair: config.fair }, config);
        sync.set_state(permits);
        Self { sync }
    }

    /// Take one permit, blocking until available or interrupted
    pub fn acquire(&self) -> SyncResult<()> {
        self.sync.acquire_shared_interruptibly(1)
    }

    pub fn acquire_many(&self, permits: u32) -> SyncResult<()> {
        self.sync.acquire_shared_interruptibly(i64::from(permits))
    }

    pub fn acquire_uninterruptibly(&self) -> SyncResult<()> {
        self.sync.acquire_shared(1)
    }

    /// Take a permit only if one is available right now, barging even when fair
    pub fn try_acquire(&self) -> bool {
        SemaphoreStrategy::barging_try_acquire(&self.sync, 1) >= 0
    }

    pub fn try_acquire_many(&self, permits: u32) -> bool {
        SemaphoreStrategy::barging_try_acquire(&self.sync, i64::from(permits)) >= 0
    }

    /// Take a permit within `timeout`, honouring the fairness policy
    pub fn try_acquire_for(&self, timeout: Duration) -> SyncResult<bool> {
        self.sync.try_acquire_shared_nanos(1, timeout)
    }

    pub fn release(&self) -> SyncResult<()> {
        self.sync.release_shared(1).map(|_| ())
    }

    pub fn release_many(&self, permits: u32) -> SyncResult<()> {
        self.sync.release_shared(i64::from(permits)).map(|_| ())
    }

    pub fn available_permits(&self) -> i64 {
        self.sync.state()
    }

    /// Take every available permit, returning how many were taken
    pub fn drain_permits(&self) -> i64 {
        loop {
            let current = self.sync.state();
            if current == 0 || self.sync.compare_and_set_state(current, 0) {
                return current;
            }
        }
    }

    pub fn is_fair(&self) -> bool {
        self.sync.strategy().fair
    }

    pub fn has_queued_threads(&self) -> bool {
        self.sync.has_queued_threads()
    }

    pub fn queue_length(&self) -> usize {
        self.sync.queue_length()
    }

    pub fn sync(&self) -> &Synchronizer<SemaphoreStrategy> {
        &self.sync
    }
}
