/*!
 * Exclusive Acquire/Release
 *
 * Blocking, interruptible and timed exclusive acquisition on top of the wait
 * queue, plus the wake-up path shared by every release.
 *
 * # Missed-Wakeup Handshake
 *
 * A queued thread never parks straight after failing the hook. It first makes
 * sure its predecessor is SIGNAL and then retries once more; only a failure
 * observed *after* the predecessor became SIGNAL licenses parking. A release
 * that slipped in between is therefore either seen by the retry or sees the
 * SIGNAL and unparks the thread (whose permit makes the park return).
 */

use super::node::{Mode, Node, SIGNAL};
use super::synchronizer::Synchronizer;
use super::thread::{park, Deadline, ThreadHandle};
use super::traits::Strategy;
use crate::errors::{SyncError, SyncResult};
use std::hint;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

impl<S: Strategy> Synchronizer<S> {
    /// Acquire in exclusive mode, ignoring interrupts
    ///
    /// Calls [`Strategy::try_acquire`] at least once and queues until it
    /// succeeds. An interrupt delivered while queued is re-asserted on the
    /// calling thread before returning.
    pub fn acquire(&self, arg: i64) -> SyncResult<()> {
        if self.strategy().try_acquire(self, arg)? {
            return Ok(());
        }
        let node = self.add_waiter(Mode::Exclusive);
        if self.acquire_queued(&node, arg)? {
            ThreadHandle::self_interrupt();
        }
        Ok(())
    }

    /// Acquire in exclusive mode, aborting with [`SyncError::Interrupted`]
    pub fn acquire_interruptibly(&self, arg: i64) -> SyncResult<()> {
        if ThreadHandle::interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.strategy().try_acquire(self, arg)? {
            return Ok(());
        }
        self.do_acquire_interruptibly(arg)
    }

    /// Acquire in exclusive mode, giving up after `timeout`
    ///
    /// Returns `Ok(false)` on timeout. A zero timeout makes exactly one
    /// attempt.
    pub fn try_acquire_nanos(&self, arg: i64, timeout: Duration) -> SyncResult<bool> {
        if ThreadHandle::interrupted() {
            return Err(SyncError::Interrupted);
        }
        if self.strategy().try_acquire(self, arg)? {
            return Ok(true);
        }
        self.do_acquire_nanos(arg, timeout)
    }

    /// Release in exclusive mode
    ///
    /// Returns the hook's verdict. On a full release the first live queued
    /// thread is woken.
    pub fn release(&self, arg: i64) -> SyncResult<bool> {
        if !self.strategy().try_release(self, arg)? {
            return Ok(false);
        }
        if let Some(head) = self.head.load_full() {
            if head.status() != 0 {
                self.unpark_successor(&head);
            }
        }
        Ok(true)
    }

    /// Queue loop for a node that is already enqueued
    ///
    /// Returns whether the thread was interrupted while waiting. Used by
    /// [`Self::acquire`] and by condition waits to reacquire.
    pub(crate) fn acquire_queued(&self, node: &Arc<Node>, arg: i64) -> SyncResult<bool> {
        let mut interrupted = false;
        loop {
            let pred = node.predecessor();
            if self.is_head(&pred) && self.try_acquire_queued(node, arg)? {
                self.set_head(node);
                pred.next.store(None);
                return Ok(interrupted);
            }
            if should_park_after_failed_acquire(&pred, node) && park_and_check_interrupt() {
                interrupted = true;
            }
        }
    }

    fn do_acquire_interruptibly(&self, arg: i64) -> SyncResult<()> {
        let node = self.add_waiter(Mode::Exclusive);
        loop {
            let pred = node.predecessor();
            if self.is_head(&pred) && self.try_acquire_queued(&node, arg)? {
                self.set_head(&node);
                pred.next.store(None);
                return Ok(());
            }
            if should_park_after_failed_acquire(&pred, &node) && park_and_check_interrupt() {
                self.cancel_acquire(&node);
                debug!(sync = self.id(), "exclusive acquire interrupted");
                return Err(SyncError::Interrupted);
            }
        }
    }

    fn do_acquire_nanos(&self, arg: i64, timeout: Duration) -> SyncResult<bool> {
        if timeout.is_zero() {
            return Ok(false);
        }
        let deadline = Deadline::after(timeout);
        let node = self.add_waiter(Mode::Exclusive);
        loop {
            let pred = node.predecessor();
            if self.is_head(&pred) && self.try_acquire_queued(&node, arg)? {
                self.set_head(&node);
                pred.next.store(None);
                return Ok(true);
            }

            let remaining = deadline.remaining();
            if remaining.is_zero() {
                self.cancel_acquire(&node);
                trace!(sync = self.id(), ?timeout, "exclusive acquire timed out");
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
                debug!(sync = self.id(), "timed exclusive acquire interrupted");
                return Err(SyncError::Interrupted);
            }
        }
    }

    /// Call the exclusive hook from inside the queue, cancelling the node if
    /// the hook fails so the queue is not left holding a dead waiter
    fn try_acquire_queued(&self, node: &Arc<Node>, arg: i64) -> SyncResult<bool> {
        self.strategy().try_acquire(self, arg).map_err(|err| {
            self.cancel_acquire(node);
            err
        })
    }

    /// Wake the first live successor of `node`
    ///
    /// The forward hint is tried first; if it is missing or cancelled the
    /// queue is scanned backwards from the tail for the live node closest to
    /// `node`.
    pub(crate) fn unpark_successor(&self, node: &Arc<Node>) {
        let status = node.status();
        if status < 0 {
            // Failure is fine: the waiter may have changed it already
            node.cas_status(status, 0);
        }

        let mut successor = node.next.load_full();
        if successor.as_ref().map_or(true, |s| s.is_cancelled()) {
            successor = None;
            for candidate in self.nodes_from_tail() {
                if Arc::ptr_eq(&candidate, node) {
                    break;
                }
                if !candidate.is_cancelled() {
                    successor = Some(candidate);
                }
            }
        }

        if let Some(successor) = successor {
            successor.unpark_thread();
        }
    }
}

/// Decide whether a thread whose acquire just failed may park
///
/// Returns `true` only when `pred` is already SIGNAL. Otherwise it either
/// skips over cancelled predecessors or sets `pred` to SIGNAL, and returns
/// `false` so the caller retries before parking.
pub(crate) fn should_park_after_failed_acquire(pred: &Arc<Node>, node: &Arc<Node>) -> bool {
    let status = pred.status();
    if status == SIGNAL {
        return true;
    }

    if status > 0 {
        let mut pred = pred.clone();
        loop {
            pred = pred.predecessor();
            node.prev.store(Some(pred.clone()));
            if !pred.is_cancelled() {
                break;
            }
        }
        pred.next.store(Some(node.clone()));
    } else {
        // INITIAL or PROPAGATE: ask for a signal, but check again first
        pred.cas_status(status, SIGNAL);
    }
    false
}

/// Park, then test-and-clear the interrupt flag
#[inline]
pub(crate) fn park_and_check_interrupt() -> bool {
    park(None);
    ThreadHandle::interrupted()
}
