/*!
 * Condition Queues
 *
 * A condition parks the exclusive holder off the sync queue: the holder fully
 * releases, waits in the condition's FIFO list, and is moved back onto the
 * sync queue by a signal (or by itself on timeout/interrupt) to reacquire
 * with its saved state.
 *
 * # Interrupt Exit Modes
 *
 * - interrupt observed before any signal: the wait fails with
 *   [`SyncError::Interrupted`], after reacquiring
 * - signal came first: the wait succeeds and the interrupt flag is re-raised
 */

use super::node::{Mode, Node, CANCELLED, CONDITION, INITIAL, SIGNAL};
use super::synchronizer::Synchronizer;
use super::thread::{park, Deadline, ThreadHandle};
use super::traits::Strategy;
use crate::errors::{SyncError, SyncResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::hint;
use std::mem;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// How a condition wait ended with respect to interrupts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptMode {
    None,
    /// Re-raise the flag after reacquiring
    Reinterrupt,
    /// Fail with `Interrupted` after reacquiring
    Throw,
}

/// Condition variable bound to the synchronizer that created it
///
/// Every method takes that synchronizer and requires the calling thread to
/// hold it exclusively (as reported by [`Strategy::is_held_exclusively`]).
///
/// # Examples
///
/// ```
/// use ai_os_sync::locks::ReentrantLock;
/// use std::sync::Arc;
/// use std::thread;
///
/// let lock = Arc::new(ReentrantLock::new());
/// let ready = Arc::new(lock.new_condition());
///
/// let (l, c) = (lock.clone(), ready.clone());
/// let waiter = thread::spawn(move || {
///     l.lock().unwrap();
///     c.wait_uninterruptibly(l.sync()).unwrap();
///     l.unlock().unwrap();
/// });
///
/// loop {
///     lock.lock().unwrap();
///     if ready.has_waiters(lock.sync()).unwrap() {
///         ready.signal(lock.sync()).unwrap();
///         lock.unlock().unwrap();
///         break;
///     }
///     lock.unlock().unwrap();
///     thread::yield_now();
/// }
/// waiter.join().unwrap();
/// ```
pub struct ConditionObject {
    sync_id: u64,
    waiters: Mutex<VecDeque<Arc<Node>>>,
}

impl ConditionObject {
    pub(crate) fn new(sync_id: u64) -> Self {
        Self {
            sync_id,
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    #[inline]
    pub(crate) fn sync_id(&self) -> u64 {
        self.sync_id
    }

    // ---------------------------------------------------------------------
    // Waiting
    // ---------------------------------------------------------------------

    /// Release, wait for a signal, reacquire
    ///
    /// Fails with [`SyncError::Interrupted`] if interrupted before a signal;
    /// the lock is held again either way.
    pub fn wait<S: Strategy>(&self, sync: &Synchronizer<S>) -> SyncResult<()> {
        if ThreadHandle::interrupted() {
            return Err(SyncError::Interrupted);
        }
        self.check_owner(sync)?;
        let node = self.add_condition_waiter();
        let saved = self.fully_release(sync, &node)?;

        let mut mode = InterruptMode::None;
        while !sync.is_on_sync_queue(&node) {
            park(None);
            mode = self.check_interrupt_while_waiting(sync, &node);
            if mode != InterruptMode::None {
                break;
            }
        }
        let still_listed = mode == InterruptMode::Throw;
        self.reacquire(sync, &node, saved, mode, still_listed)
    }

    /// Release, wait for a signal, reacquire; interrupts are deferred and
    /// re-raised once on return
    pub fn wait_uninterruptibly<S: Strategy>(&self, sync: &Synchronizer<S>) -> SyncResult<()> {
        self.check_owner(sync)?;
        let node = self.add_condition_waiter();
        let saved = self.fully_release(sync, &node)?;

        let mut interrupted = false;
        while !sync.is_on_sync_queue(&node) {
            park(None);
            if ThreadHandle::interrupted() {
                interrupted = true;
            }
        }
        if sync.acquire_queued(&node, saved)? || interrupted {
            ThreadHandle::self_interrupt();
        }
        Ok(())
    }

    /// Timed wait in nanoseconds
    ///
    /// Returns an estimate of the time left; zero or negative means the wait
    /// timed out.
    pub fn wait_nanos<S: Strategy>(&self, sync: &Synchronizer<S>, nanos: i64) -> SyncResult<i64> {
        let timeout = Duration::from_nanos(u64::try_from(nanos).unwrap_or(0));
        let deadline = Deadline::after(timeout);
        self.timed_wait(sync, deadline)?;
        Ok(deadline.remaining_nanos())
    }

    /// Wait until signalled or `deadline` passes; `false` if it passed
    pub fn wait_until<S: Strategy>(&self, sync: &Synchronizer<S>, deadline: Instant) -> SyncResult<bool> {
        Ok(!self.timed_wait(sync, Deadline::at(deadline))?)
    }

    /// Wait until signalled or `timeout` elapses; `false` if it elapsed
    pub fn wait_timeout<S: Strategy>(&self, sync: &Synchronizer<S>, timeout: Duration) -> SyncResult<bool> {
        Ok(!self.timed_wait(sync, Deadline::after(timeout))?)
    }

    /// Shared body of the timed waits; returns whether the wait timed out
    fn timed_wait<S: Strategy>(&self, sync: &Synchronizer<S>, deadline: Deadline) -> SyncResult<bool> {
        if ThreadHandle::interrupted() {
            return Err(SyncError::Interrupted);
        }
        self.check_owner(sync)?;
        let node = self.add_condition_waiter();
        let saved = self.fully_release(sync, &node)?;

        let mut mode = InterruptMode::None;
        let mut timed_out = false;
        while !sync.is_on_sync_queue(&node) {
            let remaining = deadline.remaining();
            if remaining.is_zero() {
                timed_out = self.transfer_after_cancelled_wait(sync, &node);
                if timed_out {
                    trace!(sync = sync.id(), "condition wait timed out");
                }
                break;
            }
            if sync.config().should_park_for(remaining) {
                park(deadline.instant());
            } else {
                hint::spin_loop();
            }
            mode = self.check_interrupt_while_waiting(sync, &node);
            if mode != InterruptMode::None {
                break;
            }
        }

        let still_listed = timed_out || mode == InterruptMode::Throw;
        self.reacquire(sync, &node, saved, mode, still_listed)?;
        Ok(timed_out)
    }

    /// Reacquire with the saved state, then report the interrupt mode
    fn reacquire<S: Strategy>(
        &self,
        sync: &Synchronizer<S>,
        node: &Arc<Node>,
        saved: i64,
        mut mode: InterruptMode,
        still_listed: bool,
    ) -> SyncResult<()> {
        if sync.acquire_queued(node, saved)? && mode != InterruptMode::Throw {
            mode = InterruptMode::Reinterrupt;
        }
        // The node left the list on its own, no signaller removed it
        if still_listed {
            self.unlink_cancelled_waiters();
        }
        match mode {
            InterruptMode::Throw => {
                debug!(sync = sync.id(), "condition wait interrupted");
                Err(SyncError::Interrupted)
            }
            InterruptMode::Reinterrupt => {
                ThreadHandle::self_interrupt();
                Ok(())
            }
            InterruptMode::None => Ok(()),
        }
    }

    // ---------------------------------------------------------------------
    // Signalling
    // ---------------------------------------------------------------------

    /// Move the longest-waiting thread back to the sync queue
    pub fn signal<S: Strategy>(&self, sync: &Synchronizer<S>) -> SyncResult<()> {
        self.check_owner(sync)?;
        loop {
            let Some(first) = self.waiters.lock().pop_front() else {
                return Ok(());
            };
            // Skip nodes that cancelled in the meantime
            if transfer_for_signal(sync, &first) {
                return Ok(());
            }
        }
    }

    /// Move every waiting thread back to the sync queue
    pub fn signal_all<S: Strategy>(&self, sync: &Synchronizer<S>) -> SyncResult<()> {
        self.check_owner(sync)?;
        let all = mem::take(&mut *self.waiters.lock());
        let transferred = all
            .iter()
            .filter(|node| transfer_for_signal(sync, node))
            .count();
        trace!(sync = sync.id(), transferred, "signalled all condition waiters");
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Introspection
    // ---------------------------------------------------------------------

    /// Whether any thread is waiting on this condition
    pub fn has_waiters<S: Strategy>(&self, sync: &Synchronizer<S>) -> SyncResult<bool> {
        self.check_owner(sync)?;
        Ok(self.waiters.lock().iter().any(|node| node.status() == CONDITION))
    }

    /// Estimated number of threads waiting on this condition
    pub fn wait_queue_length<S: Strategy>(&self, sync: &Synchronizer<S>) -> SyncResult<usize> {
        self.check_owner(sync)?;
        Ok(self
            .waiters
            .lock()
            .iter()
            .filter(|node| node.status() == CONDITION)
            .count())
    }

    /// Snapshot of threads waiting on this condition, longest-waiting first
    pub fn waiting_threads<S: Strategy>(&self, sync: &Synchronizer<S>) -> SyncResult<Vec<ThreadHandle>> {
        self.check_owner(sync)?;
        Ok(self
            .waiters
            .lock()
            .iter()
            .filter(|node| node.status() == CONDITION)
            .filter_map(|node| node.thread())
            .collect())
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn check_owner<S: Strategy>(&self, sync: &Synchronizer<S>) -> SyncResult<()> {
        if self.sync_id != sync.id() {
            return Err(SyncError::ForeignCondition);
        }
        if !sync.strategy().is_held_exclusively(sync)? {
            return Err(SyncError::illegal_monitor_state(
                "condition used without holding the synchronizer exclusively",
            ));
        }
        Ok(())
    }

    fn add_condition_waiter(&self) -> Arc<Node> {
        let node = Node::new(Mode::Exclusive, CONDITION);
        let mut waiters = self.waiters.lock();
        if waiters.back().is_some_and(|last| last.status() != CONDITION) {
            waiters.retain(|node| node.status() == CONDITION);
        }
        waiters.push_back(node.clone());
        node
    }

    fn unlink_cancelled_waiters(&self) {
        self.waiters.lock().retain(|node| node.status() == CONDITION);
    }

    /// Release with the whole saved state; on failure the node is cancelled
    /// and left for the next prune
    fn fully_release<S: Strategy>(&self, sync: &Synchronizer<S>, node: &Arc<Node>) -> SyncResult<i64> {
        let saved = sync.state();
        let outcome = match sync.release(saved) {
            Ok(true) => return Ok(saved),
            Ok(false) => SyncError::illegal_monitor_state("full release before condition wait failed"),
            Err(err) => err,
        };
        node.set_status(CANCELLED);
        warn!(sync = sync.id(), saved, error = %outcome, "could not fully release before waiting");
        Err(outcome)
    }

    fn check_interrupt_while_waiting<S: Strategy>(
        &self,
        sync: &Synchronizer<S>,
        node: &Arc<Node>,
    ) -> InterruptMode {
        if !ThreadHandle::interrupted() {
            InterruptMode::None
        } else if self.transfer_after_cancelled_wait(sync, node) {
            InterruptMode::Throw
        } else {
            InterruptMode::Reinterrupt
        }
    }

    /// Transfer a node whose wait was cut short by timeout or interrupt
    ///
    /// Returns `true` if it got there before a signal did. Otherwise a
    /// signaller owns the transfer and we wait until its enqueue is visible:
    /// the window is a few instructions, so yielding is enough.
    fn transfer_after_cancelled_wait<S: Strategy>(&self, sync: &Synchronizer<S>, node: &Arc<Node>) -> bool {
        if node.cas_status(CONDITION, INITIAL) {
            sync.enq(node);
            return true;
        }
        while !sync.is_on_sync_queue(node) {
            thread::yield_now();
        }
        false
    }
}

/// Move a signalled node onto the sync queue
///
/// Returns `false` if the node was cancelled before the signal landed.
fn transfer_for_signal<S: Strategy>(sync: &Synchronizer<S>, node: &Arc<Node>) -> bool {
    if !node.cas_status(CONDITION, INITIAL) {
        return false;
    }

    // Ask the new predecessor for a wake-up; if it is cancelled or the CAS
    // races, wake the thread so it resyncs itself.
    let pred = sync.enq(node);
    let status = pred.status();
    if status > 0 || !pred.cas_status(status, SIGNAL) {
        node.unpark_thread();
    }
    trace!(sync = sync.id(), "condition waiter transferred to sync queue");
    true
}

impl fmt::Debug for ConditionObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionObject")
            .field("sync_id", &self.sync_id)
            .field("listed", &self.waiters.lock().len())
            .finish()
    }
}

impl<S: Strategy> Synchronizer<S> {
    /// Create a condition bound to this synchronizer
    pub fn new_condition(&self) -> ConditionObject {
        ConditionObject::new(self.id())
    }

    /// Whether `condition` was created by this synchronizer
    pub fn owns(&self, condition: &ConditionObject) -> bool {
        condition.sync_id() == self.id()
    }

    /// Whether any thread waits on `condition`; see [`ConditionObject::has_waiters`]
    pub fn has_waiters(&self, condition: &ConditionObject) -> SyncResult<bool> {
        condition.has_waiters(self)
    }

    pub fn wait_queue_length(&self, condition: &ConditionObject) -> SyncResult<usize> {
        condition.wait_queue_length(self)
    }

    pub fn waiting_threads(&self, condition: &ConditionObject) -> SyncResult<Vec<ThreadHandle>> {
        condition.waiting_threads(self)
    }
}
