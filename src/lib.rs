/*!
 * AI-OS Sync Library
 * Queued blocking-synchronization framework and the primitives built on it
 */

pub mod errors;
pub mod locks;
pub mod monitoring;
pub mod sync;

// Re-exports
pub use errors::*;
pub use locks::{CountDownLatch, Mutex, ReadWriteLock, ReentrantLock, Semaphore};
pub use sync::{ConditionObject, Mode, StateCell, Strategy, SyncConfig, Synchronizer, ThreadHandle};
