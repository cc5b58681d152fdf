/*!
 * Shared Acquire/Release with Propagation
 *
 * A single successful shared acquire may license several more, so a thread
 * that becomes head in shared mode keeps the wake-up going down the queue.
 * PROPAGATE on the head records that a release happened while nobody needed
 * a signal, so a thread queuing right after still sees the obligation.
 */

use super::exclusive::{park_and_check_interrupt, should_park_after_failed_acquire};
use super::node::{points_to, Mode, Node, INITIAL, PROPAGATE, SIGNAL};
use super::synchronizer::Synchronizer;
use super::thread::{park, Deadline, ThreadHandle};
use super::traits::Strategy;
use crate::errors::{SyncError, SyncResult};
use std::hint;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

impl<S: Strategy> Synchronizer<S> {
    /// Acquire in shared mode, ignoring interrupts
    pub fn acquire_shared(&self, arg: i64) -> SyncResult<()> {
        if self.strategy().try_acquire_shared(self, arg)? >= 0 {
            return Ok(());
        }
        self.do_acquire_shared(arg)
    }

    /// Acquire in shared mode, aborting with [`SyncError::Interrupted`]
    pub fn acquire_shared_interruptibly(&self, arg: i64) -> SyncResult<()> {
        if ThreadHandle::interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.strategy().try_acquire_shared(self, arg)? >= 0 {
            return Ok(());
        }
        self.do_acquire_shared_interruptibly(arg)
    }

    /// Acquire in shared mode, giving up after `timeout`
    pub fn try_acquire_shared_nanos(&self, arg: i64, timeout: Duration) -> SyncResult<bool> {
        if ThreadHandle::interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.strategy().try_acquire_shared(self, arg)? >= 0 {
            return Ok(true);
        }
        self.do_acquire_shared_nanos(arg, timeout)
    }

    /// Release in shared mode
    ///
    /// Returns the hook's verdict; when `true`, queued shared waiters are
    /// woken transitively.
    pub fn release_shared(&self, arg: i64) -> SyncResult<bool> {
        if self.strategy().try_release_shared(self, arg)? {
            self.do_release_shared();
            return Ok(true);
        }
        Ok(false)
    }

    fn do_acquire_shared(&self, arg: i64) -> SyncResult<()> {
        let node = self.add_waiter(Mode::Shared);
        let mut interrupted = false;
        loop {
            let pred = node.predecessor();
            if self.is_head(&pred) {
                let granted = self.try_acquire_shared_queued(&node, arg)?;
                if granted >= 0 {
                    self.set_head_and_propagate(&node, granted);
                    pred.next.store(None);
                    if interrupted {
                        ThreadHandle::self_interrupt();
                    }
                    return Ok(());
                }
            }
            if should_park_after_failed_acquire(&pred, &node) && park_and_check_interrupt() {
                interrupted = true;
            }
        }
    }

    fn do_acquire_shared_interruptibly(&self, arg: i64) -> SyncResult<()> {
        let node = self.add_waiter(Mode::Shared);
        loop {
            let pred = node.predecessor();
            if self.is_head(&pred) {
                let granted = self.try_acquire_shared_queued(&node, arg)?;
                if granted >= 0 {
                    self.set_head_and_propagate(&node, granted);
                    pred.next.store(None);
                    return Ok(());
                }
            }
            if should_park_after_failed_acquire(&pred, &node) && park_and_check_interrupt() {
                self.cancel_acquire(&node);
                debug!(sync = self.id(), "shared acquire interrupted");
                return Err(SyncError::Interrupted);
            }
        }
    }

    fn do_acquire_shared_nanos(&self, arg: i64, timeout: Duration) -> SyncResult<bool> {
        if timeout.is_zero() {
            return Ok(false);
        }
        let deadline = Deadline::after(timeout);
        let node = self.add_waiter(Mode::Shared);
        loop {
            let pred = node.predecessor();
            if self.is_head(&pred) {
                let granted = self.try_acquire_shared_queued(&node, arg)?;
                if granted >= 0 {
                    self.set_head_and_propagate(&node, granted);
                    pred.next.store(None);
                    return Ok(true);
                }
            }

            let remaining = deadline.remaining();
            if remaining.is_zero() {
                self.cancel_acquire(&node);
                trace!(sync = self.id(), ?timeout, "shared acquire timed out");
                return Ok(false);
            }

            if should_park_after_failed_acquire(&pred, &node) {
                if self.config().should_park_for(remaining) {
                    park(deadline.instant());
                } else {
                    hint::spin_loop();
                }
            }

            if ThreadHandle::interrupted() {
                self.cancel_acquire(&node);
                debug!(sync = self.id(), "timed shared acquire interrupted");
                return Err(SyncError::Interrupted);
            }
        }
    }

    fn try_acquire_shared_queued(&self, node: &Arc<Node>, arg: i64) -> SyncResult<i64> {
        self.strategy().try_acquire_shared(self, arg).map_err(|err| {
            self.cancel_acquire(node);
            err
        })
    }

    /// Become head and, if more shared acquires may succeed, keep waking
    ///
    /// Both the old and the new head are checked: a concurrent release may
    /// have left its PROPAGATE/SIGNAL mark on either. This is conservative and
    /// can cause an unnecessary wake-up, never a missed one.
    fn set_head_and_propagate(&self, node: &Arc<Node>, granted: i64) {
        let old_head = self.head.load_full();
        self.set_head(node);

        let pending = |head: Option<Arc<Node>>| head.map_or(true, |h| h.status() < 0);
        if granted > 0 || pending(old_head) || pending(self.head.load_full()) {
            let next = node.next.load_full();
            if next.map_or(true, |n| n.is_shared()) {
                self.do_release_shared();
            }
        }
    }

    /// Release action for shared mode: signal the successor and make sure the
    /// signal propagates
    ///
    /// Loops until a whole pass observes the same head, since new shared
    /// heads may be installed while this runs.
    pub(crate) fn do_release_shared(&self) {
        loop {
            let head = self.head.load_full();
            if let Some(h) = &head {
                if !self.is_tail(h) {
                    let status = h.status();
                    if status == SIGNAL {
                        if !h.cas_status(SIGNAL, INITIAL) {
                            continue;
                        }
                        self.unpark_successor(h);
                    } else if status == INITIAL && !h.cas_status(INITIAL, PROPAGATE) {
                        continue;
                    }
                }
            }

            let unchanged = match &head {
                Some(h) => points_to(&self.head, h),
                None => self.head.load().is_none(),
            };
            if unchanged {
                break;
            }
        }
    }
}
