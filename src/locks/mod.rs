/*!
 * Reference Primitives
 *
 * Locks built purely on the public [`Synchronizer`](crate::sync::Synchronizer)
 * API:
 * - Mutex (non-reentrant, exclusive)
 * - ReentrantLock (exclusive, fair or barging)
 * - Semaphore (shared, fair or barging)
 * - CountDownLatch (shared, one-shot)
 * - ReadWriteLock (shared readers, exclusive writer)
 *
 * Each exposes `sync()` for conditions and queue introspection.
 */

mod latch;
mod mutex;
mod reentrant;
mod rwlock;
mod semaphore;

// Re-export public API
pub use latch::{CountDownLatch, LatchStrategy};
pub use mutex::{Mutex, MutexStrategy};
pub use reentrant::{ReentrantLock, ReentrantStrategy};
pub use rwlock::{ReadWriteLock, ReadWriteStrategy};
pub use semaphore::{Semaphore, SemaphoreStrategy};
