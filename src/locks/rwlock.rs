/*!
 * Read/Write Lock
 *
 * State encoding: `-1` a writer holds the lock, `n > 0` that many readers
 * hold it, `0` free. Not reentrant in either mode.
 *
 * Non-fair readers back off while the longest-waiting thread is a writer, so
 * a steady stream of readers cannot starve writers indefinitely.
 */

use crate::errors::{SyncError, SyncResult};
use crate::sync::{ConditionObject, Strategy, SyncConfig, Synchronizer, ThreadHandle};
use std::time::Duration;

const WRITE_LOCKED: i64 = -1;

/// Exclusive (writer) and shared (reader) hooks for [`ReadWriteLock`]
#[derive(Debug, Default)]
pub struct ReadWriteStrategy {
    fair: bool,
}

impl ReadWriteStrategy {
    fn barging_try_write(sync: &Synchronizer<Self>) -> bool {
        if sync.compare_and_set_state(0, WRITE_LOCKED) {
            sync.set_exclusive_owner(Some(ThreadHandle::current()));
            return true;
        }
        false
    }

    fn barging_try_read(sync: &Synchronizer<Self>) -> SyncResult<bool> {
        loop {
            let c = sync.state();
            if c < 0 {
                return Ok(false);
            }
            if sync.compare_and_set_state(c, Self::one_more_reader(c)?) {
                return Ok(true);
            }
        }
    }

    fn one_more_reader(c: i64) -> SyncResult<i64> {
        c.checked_add(1)
            .ok_or_else(|| SyncError::illegal_monitor_state("maximum read lock count exceeded"))
    }

    fn reader_should_block(&self, sync: &Synchronizer<Self>) -> bool {
        if self.fair {
            sync.has_queued_predecessors()
        } else {
            sync.apparently_first_queued_is_exclusive()
        }
    }
}

impl Strategy for ReadWriteStrategy {
    fn try_acquire(&self, sync: &Synchronizer<Self>, _arg: i64) -> SyncResult<bool> {
        if self.fair && sync.has_queued_predecessors() {
            return Ok(false);
        }
        Ok(Self::barging_try_write(sync))
    }

    fn try_release(&self, sync: &Synchronizer<Self>, _arg: i64) -> SyncResult<bool> {
        if sync.state() != WRITE_LOCKED || !sync.is_owned_by_current() {
            return Err(SyncError::illegal_monitor_state(
                "current thread does not hold the write lock",
            ));
        }
        sync.set_exclusive_owner(None);
        sync.set_state(0);
        Ok(true)
    }

    fn try_acquire_shared(&self, sync: &Synchronizer<Self>, _arg: i64) -> SyncResult<i64> {
        loop {
            let c = sync.state();
            if c < 0 || self.reader_should_block(sync) {
                return Ok(-1);
            }
            if sync.compare_and_set_state(c, Self::one_more_reader(c)?) {
                // Readers never exclude each other, keep waking
                return Ok(1);
            }
        }
    }

    fn try_release_shared(&self, sync: &Synchronizer<Self>, _arg: i64) -> SyncResult<bool> {
        loop {
            let c = sync.state();
            if c <= 0 {
                return Err(SyncError::illegal_monitor_state("read lock is not held"));
            }
            if sync.compare_and_set_state(c, c - 1) {
                return Ok(c == 1);
            }
        }
    }

    fn is_held_exclusively(&self, sync: &Synchronizer<Self>) -> SyncResult<bool> {
        Ok(sync.state() == WRITE_LOCKED && sync.is_owned_by_current())
    }
}

/// Lock admitting many readers or one writer
///
/// Conditions from [`Self::new_condition`] work with the write lock only.
#[derive(Debug)]
pub struct ReadWriteLock {
    sync: Synchronizer<ReadWriteStrategy>,
}

impl ReadWriteLock {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_fairness(fair: bool) -> Self {
        Self::with_config(SyncConfig::default().with_fairness(fair))
    }

    /// Lock honouring `config.fair`
    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            sync: Synchronizer::with_config(ReadWriteStrategy { fair: config.fair }, config),
        }
    }

    // Readers

    pub fn read_lock(&self) -> SyncResult<()> {
        self.sync.acquire_shared(1)
    }

    pub fn read_lock_interruptibly(&self) -> SyncResult<()> {
        self.sync.acquire_shared_interruptibly(1)
    }

    /// Barging read attempt; succeeds whenever no writer holds the lock
    pub fn try_read_lock(&self) -> SyncResult<bool> {
        ReadWriteStrategy::barging_try_read(&self.sync)
    }

    pub fn try_read_lock_for(&self, timeout: Duration) -> SyncResult<bool> {
        self.sync.try_acquire_shared_nanos(1, timeout)
    }

    pub fn read_unlock(&self) -> SyncResult<()> {
        self.sync.release_shared(1).map(|_| ())
    }

    // Writers

    pub fn write_lock(&self) -> SyncResult<()> {
        self.sync.acquire(1)
    }

    pub fn write_lock_interruptibly(&self) -> SyncResult<()> {
        self.sync.acquire_interruptibly(1)
    }

    /// Barging write attempt; succeeds only if the lock is completely free
    pub fn try_write_lock(&self) -> bool {
        ReadWriteStrategy::barging_try_write(&self.sync)
    }

    pub fn try_write_lock_for(&self, timeout: Duration) -> SyncResult<bool> {
        self.sync.try_acquire_nanos(1, timeout)
    }

    pub fn write_unlock(&self) -> SyncResult<()> {
        self.sync.release(1).map(|_| ())
    }

    // Introspection

    /// Number of read holds currently granted
    pub fn read_lock_count(&self) -> i64 {
        self.sync.state().max(0)
    }

    pub fn is_write_locked(&self) -> bool {
        self.sync.state() == WRITE_LOCKED
    }

    pub fn is_write_locked_by_current_thread(&self) -> bool {
        self.is_write_locked() && self.sync.is_owned_by_current()
    }

    pub fn is_fair(&self) -> bool {
        self.sync.strategy().fair
    }

    pub fn new_condition(&self) -> ConditionObject {
        self.sync.new_condition()
    }

    pub fn sync(&self) -> &Synchronizer<ReadWriteStrategy> {
        &self.sync
    }
}

impl Default for ReadWriteLock {
    fn default() -> Self {
        Self::new()
    }
}
