/*!
 * Count-Down Latch
 * Shared acquire succeeds once the count reaches zero; the latch never resets
 */

use crate::errors::SyncResult;
use crate::sync::{Strategy, Synchronizer};
use std::time::Duration;

/// Shared hooks for [`CountDownLatch`]
#[derive(Debug, Default)]
pub struct LatchStrategy;

impl Strategy for LatchStrategy {
    fn try_acquire_shared(&self, sync: &Synchronizer<Self>, _arg: i64) -> SyncResult<i64> {
        Ok(if sync.state() == 0 { 1 } else { -1 })
    }

    fn try_release_shared(&self, sync: &Synchronizer<Self>, _arg: i64) -> SyncResult<bool> {
        loop {
            let c = sync.state();
            if c == 0 {
                return Ok(false);
            }
            let next = c - 1;
            if sync.compare_and_set_state(c, next) {
                return Ok(next == 0);
            }
        }
    }
}

/// Lets threads wait until a fixed number of events have happened
#[derive(Debug)]
pub struct CountDownLatch {
    sync: Synchronizer<LatchStrategy>,
}

impl CountDownLatch {
    pub fn new(count: u32) -> Self {
        let sync = Synchronizer::new(LatchStrategy);
        sync.set_state(i64::from(count));
        Self { sync }
    }

    /// Block until the count reaches zero or the thread is interrupted
    pub fn wait(&self) -> SyncResult<()> {
        self.sync.acquire_shared_interruptibly(1)
    }

    /// Block until the count reaches zero; `false` if `timeout` elapsed first
    pub fn wait_timeout(&self, timeout: Duration) -> SyncResult<bool> {
        self.sync.try_acquire_shared_nanos(1, timeout)
    }

    /// Decrement the count, releasing every waiter when it reaches zero
    pub fn count_down(&self) -> SyncResult<()> {
        self.sync.release_shared(1).map(|_| ())
    }

    pub fn count(&self) -> i64 {
        self.sync.state()
    }

    pub fn sync(&self) -> &Synchronizer<LatchStrategy> {
        &self.sync
    }
}
