/*!
 * Non-Reentrant Mutex
 * State 0 = unlocked, 1 = locked; the holder is recorded as exclusive owner
 */

use crate::errors::{SyncError, SyncResult};
use crate::sync::{ConditionObject, Strategy, SyncConfig, Synchronizer, ThreadHandle};
use std::time::Duration;

/// Exclusive hooks for [`Mutex`]
#[derive(Debug, Default)]
pub struct MutexStrategy;

impl MutexStrategy {
    #[inline]
    fn try_lock(sync: &Synchronizer<Self>) -> bool {
        if sync.compare_and_set_state(0, 1) {
            sync.set_exclusive_owner(Some(ThreadHandle::current()));
            return true;
        }
        false
    }
}

impl Strategy for MutexStrategy {
    fn try_acquire(&self, sync: &Synchronizer<Self>, _arg: i64) -> SyncResult<bool> {
        Ok(Self::try_lock(sync))
    }

    fn try_release(&self, sync: &Synchronizer<Self>, _arg: i64) -> SyncResult<bool> {
        if sync.state() == 0 {
            return Err(SyncError::illegal_monitor_state("mutex is not locked"));
        }
        sync.set_exclusive_owner(None);
        sync.set_state(0);
        Ok(true)
    }

    fn is_held_exclusively(&self, sync: &Synchronizer<Self>) -> SyncResult<bool> {
        Ok(sync.state() == 1 && sync.is_owned_by_current())
    }
}

/// Blocking mutual-exclusion lock without reentrancy
///
/// A second `lock` from the holding thread deadlocks, the same as any
/// non-reentrant lock.
#[derive(Debug)]
pub struct Mutex {
    sync: Synchronizer<MutexStrategy>,
}

impl Mutex {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            sync: Synchronizer::with_config(MutexStrategy, config),
        }
    }

    /// Block until the lock is acquired
    pub fn lock(&self) -> SyncResult<()> {
        self.sync.acquire(1)
    }

    /// Block until acquired or interrupted
    pub fn lock_interruptibly(&self) -> SyncResult<()> {
        self.sync.acquire_interruptibly(1)
    }

    /// Acquire only if free right now
    pub fn try_lock(&self) -> bool {
        MutexStrategy::try_lock(&self.sync)
    }

    /// Acquire within `timeout`
    pub fn try_lock_for(&self, timeout: Duration) -> SyncResult<bool> {
        self.sync.try_acquire_nanos(1, timeout)
    }

    /// Release; fails if the mutex is not locked
    pub fn unlock(&self) -> SyncResult<()> {
        self.sync.release(1).map(|_| ())
    }

    pub fn is_locked(&self) -> bool {
        self.sync.state() != 0
    }

    pub fn new_condition(&self) -> ConditionObject {
        self.sync.new_condition()
    }

    /// Underlying synchronizer, for conditions and introspection
    pub fn sync(&self) -> &Synchronizer<MutexStrategy> {
        &self.sync
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
