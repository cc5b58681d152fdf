/*!
 * Queued Synchronizer
 *
 * State word, wait queue bookkeeping, owner tracking and introspection.
 * The acquire/release protocols live in `exclusive`, `shared` and `cancel`;
 * conditions in `condition`.
 *
 * # Queue Shape
 *
 * ```text
 *      head (dummy or last winner)                      tail
 *   +--------+  next   +--------+  next   +--------+
 *   |  h     | ------> |  n1    | ------> |  n2    |
 *   |        | <------ |        | <------ |        |
 *   +--------+  prev   +--------+  prev   +--------+
 * ```
 *
 * `tail` only moves by CAS, `head` only moves when the thread owning the
 * node right behind it wins the strategy hook.
 */

use super::config::SyncConfig;
use super::node::{cas_link, points_to, same, Link, Mode, Node, CONDITION, INITIAL};
use super::state::StateCell;
use super::thread::{ThreadHandle, ThreadInner};
use super::traits::Strategy;
use arc_swap::ArcSwapOption;
use std::fmt;
use std::iter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Identity source so conditions can tell which synchronizer made them
static NEXT_SYNC_ID: AtomicU64 = AtomicU64::new(1);

/// Blocking synchronizer built from a state word, a FIFO wait queue and a
/// [`Strategy`]
///
/// # Examples
///
/// ```
/// use ai_os_sync::errors::SyncResult;
/// use ai_os_sync::sync::{Strategy, Synchronizer};
/// use std::sync::Arc;
/// use std::thread;
///
/// struct Flag;
///
/// impl Strategy for Flag {
///     fn try_acquire(&self, sync: &Synchronizer<Self>, _: i64) -> SyncResult<bool> {
///         Ok(sync.compare_and_set_state(0, 1))
///     }
///     fn try_release(&self, sync: &Synchronizer<Self>, _: i64) -> SyncResult<bool> {
///         sync.set_state(0);
///         Ok(true)
///     }
/// }
///
/// let sync = Arc::new(Synchronizer::new(Flag));
/// sync.acquire(1).unwrap();
///
/// let other = sync.clone();
/// let waiter = thread::spawn(move || {
///     other.acquire(1).unwrap();
///     other.release(1).unwrap();
/// });
///
/// sync.release(1).unwrap();
/// waiter.join().unwrap();
/// ```
pub struct Synchronizer<S: Strategy> {
    state: StateCell,
    pub(crate) head: Link,
    pub(crate) tail: Link,
    owner: ArcSwapOption<ThreadInner>,
    id: u64,
    config: SyncConfig,
    strategy: S,
}

impl<S: Strategy> Synchronizer<S> {
    /// Create a synchronizer with state 0 and default configuration
    pub fn new(strategy: S) -> Self {
        Self::with_config(strategy, SyncConfig::default())
    }

    /// Create a synchronizer with state 0 and the given configuration
    pub fn with_config(strategy: S, config: SyncConfig) -> Self {
        Self {
            state: StateCell::new(0),
            head: ArcSwapOption::empty(),
            tail: ArcSwapOption::empty(),
            owner: ArcSwapOption::empty(),
            id: NEXT_SYNC_ID.fetch_add(1, Ordering::Relaxed),
            config,
            strategy,
        }
    }

    #[inline(always)]
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    #[inline(always)]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    #[inline(always)]
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    // ---------------------------------------------------------------------
    // State word
    // ---------------------------------------------------------------------

    /// Current synchronization state
    #[inline(always)]
    pub fn state(&self) -> i64 {
        self.state.get()
    }

    /// Overwrite the synchronization state
    #[inline(always)]
    pub fn set_state(&self, new: i64) {
        self.state.set(new);
    }

    /// Atomically set the state to `new` if it currently equals `expected`
    #[inline(always)]
    pub fn compare_and_set_state(&self, expected: i64, new: i64) -> bool {
        self.state.compare_and_set(expected, new)
    }

    // ---------------------------------------------------------------------
    // Exclusive owner
    // ---------------------------------------------------------------------

    /// Record (or clear) the thread that currently owns exclusive access
    ///
    /// Purely informational for the engine; strategies use it to implement
    /// ownership checks and reentrancy.
    pub fn set_exclusive_owner(&self, owner: Option<ThreadHandle>) {
        self.owner.store(owner.map(ThreadHandle::into_inner));
    }

    /// Thread last recorded by [`Self::set_exclusive_owner`]
    pub fn exclusive_owner(&self) -> Option<ThreadHandle> {
        self.owner.load_full().map(ThreadHandle::from_inner)
    }

    /// Whether the calling thread is the recorded exclusive owner
    pub fn is_owned_by_current(&self) -> bool {
        let current = ThreadHandle::current();
        match &*self.owner.load() {
            Some(inner) => current.same_inner(inner),
            None => false,
        }
    }

    // ---------------------------------------------------------------------
    // Queue maintenance
    // ---------------------------------------------------------------------

    /// Insert `node` at the tail, initializing the queue if needed
    ///
    /// Returns the node's predecessor.
    pub(crate) fn enq(&self, node: &Arc<Node>) -> Arc<Node> {
        loop {
            match self.tail.load_full() {
                None => {
                    let dummy = Node::dummy();
                    if cas_link(&self.head, None, Some(dummy.clone())) {
                        self.tail.store(Some(dummy));
                    }
                }
                Some(tail) => {
                    node.prev.store(Some(tail.clone()));
                    if cas_link(&self.tail, Some(&tail), Some(node.clone())) {
                        tail.next.store(Some(node.clone()));
                        return tail;
                    }
                }
            }
        }
    }

    /// Create and enqueue a node for the calling thread
    pub(crate) fn add_waiter(&self, mode: Mode) -> Arc<Node> {
        let node = Node::new(mode, INITIAL);

        // Fast path: one CAS against an initialized queue
        if let Some(tail) = self.tail.load_full() {
            node.prev.store(Some(tail.clone()));
            if cas_link(&self.tail, Some(&tail), Some(node.clone())) {
                tail.next.store(Some(node.clone()));
                trace!(sync = self.id, ?mode, "queued after failed fast path");
                return node;
            }
        }

        self.enq(&node);
        trace!(sync = self.id, ?mode, "queued via slow enqueue");
        node
    }

    /// Make `node` the head; called only by the thread that just acquired
    pub(crate) fn set_head(&self, node: &Arc<Node>) {
        self.head.store(Some(node.clone()));
        node.clear_thread();
        node.prev.store(None);
    }

    #[inline(always)]
    pub(crate) fn is_head(&self, node: &Arc<Node>) -> bool {
        points_to(&self.head, node)
    }

    #[inline(always)]
    pub(crate) fn is_tail(&self, node: &Arc<Node>) -> bool {
        points_to(&self.tail, node)
    }

    /// Whether a node that started on a condition queue is now on the sync queue
    pub(crate) fn is_on_sync_queue(&self, node: &Arc<Node>) -> bool {
        if node.status() == CONDITION || node.prev.load().is_none() {
            return false;
        }
        if node.next.load().is_some() {
            // A successor means it is definitely linked in
            return true;
        }
        // prev may be set while the tail CAS has not landed yet, so confirm
        // by walking back from the tail. The node is almost always near it.
        self.nodes_from_tail().any(|n| Arc::ptr_eq(&n, node))
    }

    /// Walk the queue from tail to head along the authoritative `prev` edge
    pub(crate) fn nodes_from_tail(&self) -> impl Iterator<Item = Arc<Node>> {
        let mut cursor = self.tail.load_full();
        iter::from_fn(move || {
            let node = cursor.take()?;
            cursor = node.prev.load_full();
            Some(node)
        })
    }

    // ---------------------------------------------------------------------
    // Introspection (best-effort snapshots)
    // ---------------------------------------------------------------------

    /// Whether any thread may be waiting to acquire
    pub fn has_queued_threads(&self) -> bool {
        let head = self.head.load_full();
        let tail = self.tail.load_full();
        !same(head.as_ref(), tail.as_ref())
    }

    /// Whether any thread has ever had to queue on this synchronizer
    pub fn has_contended(&self) -> bool {
        self.head.load().is_some()
    }

    /// Longest-waiting queued thread, if any
    pub fn first_queued_thread(&self) -> Option<ThreadHandle> {
        let head = self.head.load_full();
        let tail = self.tail.load_full();
        if same(head.as_ref(), tail.as_ref()) {
            return None;
        }

        // Usually the head's successor; only trust it while still linked
        if let Some(head) = &head {
            if let Some(first) = head.next.load_full() {
                if points_to(&first.prev, head) {
                    if let Some(thread) = first.thread() {
                        return Some(thread);
                    }
                }
            }
        }

        // The head moved or next was stale: walk back from the tail instead
        let mut first = None;
        for node in self.nodes_from_tail() {
            if self.is_head(&node) {
                break;
            }
            if let Some(thread) = node.thread() {
                first = Some(thread);
            }
        }
        first
    }

    /// Whether `thread` is currently queued
    pub fn is_queued(&self, thread: &ThreadHandle) -> bool {
        self.nodes_from_tail().any(|node| node.is_thread(thread))
    }

    /// Whether the first queued thread (if any) waits in exclusive mode
    pub fn apparently_first_queued_is_exclusive(&self) -> bool {
        let Some(head) = self.head.load_full() else {
            return false;
        };
        match head.next.load_full() {
            Some(first) => !first.is_shared() && first.has_thread(),
            None => false,
        }
    }

    /// Whether some other thread has been waiting longer than the caller
    ///
    /// Fair strategies call this first and fail the attempt when it is `true`.
    pub fn has_queued_predecessors(&self) -> bool {
        // Read tail before head: head is initialized first
        let tail = self.tail.load_full();
        let head = self.head.load_full();
        if same(head.as_ref(), tail.as_ref()) {
            return false;
        }
        match head.and_then(|h| h.next.load_full()) {
            Some(first) => !first.is_thread(&ThreadHandle::current()),
            None => true,
        }
    }

    /// Estimated number of queued threads
    pub fn queue_length(&self) -> usize {
        self.nodes_from_tail().filter(|node| node.has_thread()).count()
    }

    /// Snapshot of queued threads, longest-waiting first
    pub fn queued_threads(&self) -> Vec<ThreadHandle> {
        self.collect_threads(|_| true)
    }

    /// Snapshot of threads queued in exclusive mode, longest-waiting first
    pub fn exclusive_queued_threads(&self) -> Vec<ThreadHandle> {
        self.collect_threads(|mode| mode == Mode::Exclusive)
    }

    /// Snapshot of threads queued in shared mode, longest-waiting first
    pub fn shared_queued_threads(&self) -> Vec<ThreadHandle> {
        self.collect_threads(|mode| mode == Mode::Shared)
    }

    fn collect_threads(&self, keep: impl Fn(Mode) -> bool) -> Vec<ThreadHandle> {
        let mut threads: Vec<_> = self
            .nodes_from_tail()
            .filter(|node| keep(node.mode()))
            .filter_map(|node| node.thread())
            .collect();
        threads.reverse();
        threads
    }
}

impl<S: Strategy> fmt::Display for Synchronizer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = if self.has_queued_threads() { "non" } else { "" };
        write!(f, "Synchronizer[State = {}, {}empty queue]", self.state(), queue)
    }
}

impl<S: Strategy> fmt::Debug for Synchronizer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synchronizer")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("queue_length", &self.queue_length())
            .field("owner", &self.exclusive_owner())
            .finish()
    }
}

impl<S: Strategy> Drop for Synchronizer<S> {
    fn drop(&mut self) {
        // Break prev/next cycles left by cancelled nodes; iterative so a long
        // queue cannot overflow the stack through nested Arc drops.
        let mut cursor = self.tail.swap(None);
        while let Some(node) = cursor {
            node.next.store(None);
            cursor = node.prev.swap(None);
        }
        if let Some(head) = self.head.swap(None) {
            head.next.store(None);
        }
    }
}
