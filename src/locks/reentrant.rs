/*!
 * Reentrant Lock
 *
 * State counts holds by the owning thread; 0 means unlocked. Fair mode
 * refuses to barge past queued threads, non-fair mode lets a newcomer grab a
 * lock that was just released.
 */

use crate::errors::{SyncError, SyncResult};
use crate::sync::{ConditionObject, Strategy, SyncConfig, Synchronizer, ThreadHandle};
use std::fmt;
use std::time::Duration;

/// Exclusive hooks for [`ReentrantLock`]
#[derive(Debug, Default)]
pub struct ReentrantStrategy {
    fair: bool,
}

impl ReentrantStrategy {
    /// Acquire ignoring fairness (also used by `try_lock`)
    fn barging_try_acquire(sync: &Synchronizer<Self>, acquires: i64) -> SyncResult<bool> {
        let c = sync.state();
        if c == 0 {
            if sync.compare_and_set_state(0, acquires) {
                sync.set_exclusive_owner(Some(ThreadHandle::current()));
                return Ok(true);
            }
            return Ok(false);
        }
        Self::reenter(sync, c, acquires)
    }

    fn reenter(sync: &Synchronizer<Self>, c: i64, acquires: i64) -> SyncResult<bool> {
        if !sync.is_owned_by_current() {
            return Ok(false);
        }
        let next = c
            .checked_add(acquires)
            .ok_or_else(|| SyncError::illegal_monitor_state("maximum lock count exceeded"))?;
        // Only the owner writes here, no CAS needed
        sync.set_state(next);
        Ok(true)
    }
}

impl Strategy for ReentrantStrategy {
    fn try_acquire(&self, sync: &Synchronizer<Self>, acquires: i64) -> SyncResult<bool> {
        if !self.fair {
            return Self::barging_try_acquire(sync, acquires);
        }
        let c = sync.state();
        if c == 0 {
            if !sync.has_queued_predecessors() && sync.compare_and_set_state(0, acquires) {
                sync.set_exclusive_owner(Some(ThreadHandle::current()));
                return Ok(true);
            }
            return Ok(false);
        }
        Self::reenter(sync, c, acquires)
    }

    fn try_release(&self, sync: &Synchronizer<Self>, releases: i64) -> SyncResult<bool> {
        if !sync.is_owned_by_current() {
            return Err(SyncError::illegal_monitor_state(
                "current thread does not hold the lock",
            ));
        }
        let c = sync.state() - releases;
        let free = c == 0;
        if free {
            sync.set_exclusive_owner(None);
        }
        sync.set_state(c);
        Ok(free)
    }

    fn is_held_exclusively(&self, sync: &Synchronizer<Self>) -> SyncResult<bool> {
        Ok(sync.is_owned_by_current())
    }
}

/// Mutual-exclusion lock that the holder may re-acquire
///
/// Each `lock` must be matched by an `unlock`. Conditions created by
/// [`Self::new_condition`] save and restore the full hold count around a wait.
pub struct ReentrantLock {
    sync: Synchronizer<ReentrantStrategy>,
}

impl ReentrantLock {
    /// Non-fair lock
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_fairness(fair: bool) -> Self {
        Self::with_config(SyncConfig::default().with_fairness(fair))
    }

    /// Lock honouring `config.fair`
    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            sync: Synchronizer::with_config(ReentrantStrategy { fair: config.fair }, config),
        }
    }

    pub fn lock(&self) -> SyncResult<()> {
        self.sync.acquire(1)
    }

    pub fn lock_interruptibly(&self) -> SyncResult<()> {
        self.sync.acquire_interruptibly(1)
    }

    /// Acquire only if available right now, barging even when fair
    pub fn try_lock(&self) -> SyncResult<bool> {
        ReentrantStrategy::barging_try_acquire(&self.sync, 1)
    }

    /// Acquire within `timeout`, honouring the fairness policy
    pub fn try_lock_for(&self, timeout: Duration) -> SyncResult<bool> {
        self.sync.try_acquire_nanos(1, timeout)
    }

    pub fn unlock(&self) -> SyncResult<()> {
        self.sync.release(1).map(|_| ())
    }

    pub fn new_condition(&self) -> ConditionObject {
        self.sync.new_condition()
    }

    /// Number of holds by the calling thread, 0 if it does not own the lock
    pub fn hold_count(&self) -> i64 {
        if self.sync.is_owned_by_current() {
            self.sync.state()
        } else {
            0
        }
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.sync.is_owned_by_current()
    }

    pub fn is_locked(&self) -> bool {
        self.sync.state() != 0
    }

    pub fn is_fair(&self) -> bool {
        self.sync.strategy().fair
    }

    pub fn owner(&self) -> Option<ThreadHandle> {
        if self.sync.state() == 0 {
            None
        } else {
            self.sync.exclusive_owner()
        }
    }

    pub fn has_queued_threads(&self) -> bool {
        self.sync.has_queued_threads()
    }

    pub fn queue_length(&self) -> usize {
        self.sync.queue_length()
    }

    pub fn sync(&self) -> &Synchronizer<ReentrantStrategy> {
        &self.sync
    }
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReentrantLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.owner() {
            Some(owner) => write!(f, "ReentrantLock[Locked by thread {:?}]", owner.id()),
            None => write!(f, "ReentrantLock[Unlocked]"),
        }
    }
}

impl fmt::Debug for ReentrantLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReentrantLock")
            .field("fair", &self.is_fair())
            .field("sync", &self.sync)
            .finish()
    }
}
