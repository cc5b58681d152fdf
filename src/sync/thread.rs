/*!
 * Thread Handles and Parking
 *
 * Permit-based park/unpark for queued threads, plus a cooperative interrupt
 * flag. Each thread parks on its own address in `parking_lot_core`'s global
 * parking table, so a wakeup only ever targets the thread it was meant for.
 *
 * # Permit Semantics
 *
 * `unpark` stores a single permit. A park that finds the permit returns
 * immediately, so an unpark issued between "decided to park" and "parked"
 * is never lost. Permits do not accumulate. `interrupt` sets a sticky flag
 * that also makes every park return until the flag is cleared.
 */

use parking_lot_core::{park as park_on, unpark_one, DEFAULT_PARK_TOKEN, DEFAULT_UNPARK_TOKEN};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::{Duration, Instant};

thread_local! {
    static CURRENT: ThreadHandle = ThreadHandle::for_current();
}

/// Per-thread parking record shared by every handle to that thread
pub(crate) struct ThreadInner {
    id: ThreadId,
    name: Option<String>,
    permit: AtomicBool,
    interrupted: AtomicBool,
}

impl ThreadInner {
    /// Parking key: the address of the shared record, stable while any handle lives
    #[inline(always)]
    fn key(&self) -> usize {
        self as *const Self as usize
    }

    pub(crate) fn unpark(&self) {
        if !self.permit.swap(true, Ordering::SeqCst) {
            // SAFETY: the key is the address of a live record and the callback
            // does not call back into parking_lot_core.
            unsafe {
                unpark_one(self.key(), |_| DEFAULT_UNPARK_TOKEN);
            }
        }
    }

    fn park(&self, deadline: Option<Instant>) {
        if self.permit.swap(false, Ordering::SeqCst) || self.interrupted.load(Ordering::SeqCst) {
            return;
        }

        // Validation runs under the parking bucket lock, the same lock unpark
        // takes, so a permit or interrupt stored before it is always seen.
        let validate =
            || !self.permit.load(Ordering::SeqCst) && !self.interrupted.load(Ordering::SeqCst);

        // SAFETY: only the owning thread parks on its own key; callbacks do not
        // panic or call into parking_lot_core.
        unsafe {
            park_on(
                self.key(),
                validate,
                || {},
                |_key, _was_last| {},
                DEFAULT_PARK_TOKEN,
                deadline,
            );
        }

        // Consume whatever permit woke us (or arrived while timing out)
        self.permit.store(false, Ordering::SeqCst);
    }
}

/// Handle to a thread that can park inside a synchronizer
///
/// Cloning is cheap (one `Arc`). Two handles compare equal when they refer to
/// the same thread.
///
/// # Examples
///
/// ```
/// use ai_os_sync::sync::ThreadHandle;
/// use std::sync::mpsc;
/// use std::thread;
///
/// let (tx, rx) = mpsc::channel();
/// let worker = thread::spawn(move || {
///     tx.send(ThreadHandle::current()).unwrap();
///     while !ThreadHandle::interrupted() {
///         thread::yield_now();
///     }
/// });
///
/// rx.recv().unwrap().interrupt();
/// worker.join().unwrap();
/// ```
#[derive(Clone)]
pub struct ThreadHandle {
    inner: Arc<ThreadInner>,
}

impl ThreadHandle {
    fn for_current() -> Self {
        let thread = std::thread::current();
        Self {
            inner: Arc::new(ThreadInner {
                id: thread.id(),
                name: thread.name().map(str::to_owned),
                permit: AtomicBool::new(false),
                interrupted: AtomicBool::new(false),
            }),
        }
    }

    /// Handle for the calling thread
    pub fn current() -> Self {
        CURRENT.with(Clone::clone)
    }

    /// Test and clear the calling thread's interrupt flag
    pub fn interrupted() -> bool {
        CURRENT.with(|me| me.inner.interrupted.swap(false, Ordering::SeqCst))
    }

    /// Re-raise the interrupt flag on the calling thread
    pub(crate) fn self_interrupt() {
        CURRENT.with(|me| me.inner.interrupted.store(true, Ordering::SeqCst));
    }

    /// Interrupt the thread: sets its flag and wakes it if parked
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::SeqCst);
        // SAFETY: live key; callback does not re-enter parking_lot_core.
        unsafe {
            unpark_one(self.inner.key(), |_| DEFAULT_UNPARK_TOKEN);
        }
    }

    /// Whether the thread's interrupt flag is set (does not clear it)
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::SeqCst)
    }

    /// Whether this handle refers to the calling thread
    pub fn is_current(&self) -> bool {
        CURRENT.with(|me| Arc::ptr_eq(&me.inner, &self.inner))
    }

    /// Standard library id of the thread
    pub fn id(&self) -> ThreadId {
        self.inner.id
    }

    /// Thread name, if it was spawned with one
    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub(crate) fn from_inner(inner: Arc<ThreadInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn into_inner(self) -> Arc<ThreadInner> {
        self.inner
    }

    pub(crate) fn same_inner(&self, inner: &Arc<ThreadInner>) -> bool {
        Arc::ptr_eq(&self.inner, inner)
    }
}

impl PartialEq for ThreadHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for ThreadHandle {}

impl Hash for ThreadHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for ThreadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("interrupted", &self.is_interrupted())
            .finish()
    }
}

/// Park the calling thread until unparked, interrupted, or `deadline` passes
///
/// May also return spuriously; callers always re-check their condition.
#[inline]
pub(crate) fn park(deadline: Option<Instant>) {
    CURRENT.with(|me| me.inner.park(deadline));
}

/// Absolute point in time a timed wait gives up at
///
/// Timeouts too large to represent as an [`Instant`] never expire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Deadline(Option<Instant>);

impl Deadline {
    pub(crate) fn after(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    pub(crate) fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Time left, zero once expired
    pub(crate) fn remaining(&self) -> Duration {
        match self.0 {
            Some(at) => at.saturating_duration_since(Instant::now()),
            None => Duration::MAX,
        }
    }

    /// Signed nanoseconds left; negative once overshot
    pub(crate) fn remaining_nanos(&self) -> i64 {
        let Some(at) = self.0 else {
            return i64::MAX;
        };
        let now = Instant::now();
        if at >= now {
            i64::try_from((at - now).as_nanos()).unwrap_or(i64::MAX)
        } else {
            i64::try_from((now - at).as_nanos()).map_or(i64::MIN, |n| -n)
        }
    }

    #[inline]
    pub(crate) fn instant(&self) -> Option<Instant> {
        self.0
    }
}
