/*!
 * Wait Queue Nodes
 *
 * One node per queued acquisition attempt. Links are atomic `Arc` slots:
 * `prev` is the authoritative edge (always recoverable from the tail) and the
 * one that keeps queued nodes alive, `next` is a best-effort forward hint that
 * may be stale or empty under races.
 */

use super::thread::{ThreadHandle, ThreadInner};
use arc_swap::ArcSwapOption;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Waiting for nothing in particular (fresh node or freshly signalled head)
pub(crate) const INITIAL: i32 = 0;
/// Successor is (or will soon be) parked and must be unparked on release
pub(crate) const SIGNAL: i32 = -1;
/// Timed out, interrupted, or failed; terminal
pub(crate) const CANCELLED: i32 = 1;
/// Sitting in a condition queue, not on the sync queue
pub(crate) const CONDITION: i32 = -2;
/// A shared release must keep propagating past this head
pub(crate) const PROPAGATE: i32 = -3;

/// Acquisition discipline of a queued node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// At most one holder
    Exclusive,
    /// Any number of holders, as granted by the strategy
    Shared,
}

pub(crate) type Link = ArcSwapOption<Node>;

pub(crate) struct Node {
    status: AtomicI32,
    pub(crate) prev: Link,
    pub(crate) next: Link,
    thread: ArcSwapOption<ThreadInner>,
    mode: Mode,
}

impl Node {
    /// Queue node for the calling thread
    pub(crate) fn new(mode: Mode, status: i32) -> Arc<Self> {
        Arc::new(Self {
            status: AtomicI32::new(status),
            prev: ArcSwapOption::empty(),
            next: ArcSwapOption::empty(),
            thread: ArcSwapOption::from(Some(ThreadHandle::current().into_inner())),
            mode,
        })
    }

    /// Thread-less placeholder used as the initial head
    pub(crate) fn dummy() -> Arc<Self> {
        Arc::new(Self {
            status: AtomicI32::new(INITIAL),
            prev: ArcSwapOption::empty(),
            next: ArcSwapOption::empty(),
            thread: ArcSwapOption::empty(),
            mode: Mode::Exclusive,
        })
    }

    #[inline(always)]
    pub(crate) fn status(&self) -> i32 {
        self.status.load(Ordering::SeqCst)
    }

    #[inline(always)]
    pub(crate) fn set_status(&self, status: i32) {
        self.status.store(status, Ordering::SeqCst);
    }

    #[inline(always)]
    pub(crate) fn cas_status(&self, expected: i32, new: i32) -> bool {
        self.status
            .compare_exchange(expected, new, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    #[inline(always)]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.status() > 0
    }

    #[inline(always)]
    pub(crate) fn is_shared(&self) -> bool {
        self.mode == Mode::Shared
    }

    #[inline(always)]
    pub(crate) fn mode(&self) -> Mode {
        self.mode
    }

    /// Predecessor of a node on the sync queue
    ///
    /// Every enqueued node's `prev` is set before it becomes reachable from the
    /// tail and is cleared only when the node becomes head, by its own thread.
    #[inline]
    pub(crate) fn predecessor(&self) -> Arc<Node> {
        self.prev
            .load_full()
            .expect("queued node always has a predecessor until it becomes head")
    }

    pub(crate) fn thread(&self) -> Option<ThreadHandle> {
        self.thread.load_full().map(ThreadHandle::from_inner)
    }

    pub(crate) fn has_thread(&self) -> bool {
        self.thread.load().is_some()
    }

    pub(crate) fn clear_thread(&self) {
        self.thread.store(None);
    }

    pub(crate) fn is_thread(&self, handle: &ThreadHandle) -> bool {
        match &*self.thread.load() {
            Some(inner) => handle.same_inner(inner),
            None => false,
        }
    }

    /// Wake the node's thread, if it still has one
    pub(crate) fn unpark_thread(&self) {
        if let Some(inner) = self.thread.load_full() {
            inner.unpark();
        }
    }
}

#[inline(always)]
pub(crate) fn raw(node: Option<&Arc<Node>>) -> *const Node {
    node.map_or(ptr::null(), Arc::as_ptr)
}

/// Pointer-identity comparison of two optional nodes
#[inline(always)]
pub(crate) fn same(a: Option<&Arc<Node>>, b: Option<&Arc<Node>>) -> bool {
    raw(a) == raw(b)
}

/// Whether the link currently points at `node`
#[inline(always)]
pub(crate) fn points_to(link: &Link, node: &Arc<Node>) -> bool {
    let current = link.load();
    raw((*current).as_ref()) == Arc::as_ptr(node)
}

/// Replace the link's content if it still points at `expected`
///
/// The caller holds `expected` alive, so its address cannot be recycled while
/// the comparison runs.
#[inline]
pub(crate) fn cas_link(link: &Link, expected: Option<&Arc<Node>>, new: Option<Arc<Node>>) -> bool {
    let expected = raw(expected);
    let previous = link.compare_and_swap(expected, new);
    raw((*previous).as_ref()) == expected
}
