/*!
 * Synchronization Strategy
 *
 * The only integration surface between a concrete lock and the queue engine.
 *
 * # Design: State Semantics Live Outside the Engine
 *
 * The engine moves threads in and out of the wait queue but never interprets
 * the state word. A strategy decides what "acquired" means by reading and
 * CAS-ing that word through the synchronizer it is handed.
 */

use super::synchronizer::Synchronizer;
use crate::errors::{SyncError, SyncResult};

/// Acquire/release hooks for a synchronizer
///
/// Implementations must be:
/// - **Thread-safe**: called concurrently from every contending thread
/// - **Non-blocking**: a hook must never park; the engine does the waiting
///
/// Override only the hooks for the modes the primitive supports. The defaults
/// fail with [`SyncError::Unsupported`].
///
/// # Examples
///
/// ```
/// use ai_os_sync::errors::SyncResult;
/// use ai_os_sync::sync::{Strategy, Synchronizer};
///
/// /// One-shot latch: shared acquire succeeds once state is non-zero
/// struct Latch;
///
/// impl Strategy for Latch {
///     fn try_acquire_shared(&self, sync: &Synchronizer<Self>, _arg: i64) -> SyncResult<i64> {
///         Ok(if sync.state() != 0 { 1 } else { -1 })
///     }
///
///     fn try_release_shared(&self, sync: &Synchronizer<Self>, _arg: i64) -> SyncResult<bool> {
///         sync.set_state(1);
///         Ok(true)
///     }
/// }
///
/// let latch = Synchronizer::new(Latch);
/// latch.release_shared(1).unwrap();
/// latch.acquire_shared(1).unwrap(); // Returns at once, the latch is open
/// ```
pub trait Strategy: Sized + Send + Sync {
    /// Attempt to acquire in exclusive mode
    fn try_acquire(&self, sync: &Synchronizer<Self>, arg: i64) -> SyncResult<bool> {
        let _ = (sync, arg);
        Err(SyncError::unsupported("try_acquire"))
    }

    /// Attempt to release in exclusive mode
    ///
    /// Returns `true` only if the synchronizer is now fully released, so that
    /// waiting threads may attempt to acquire.
    fn try_release(&self, sync: &Synchronizer<Self>, arg: i64) -> SyncResult<bool> {
        let _ = (sync, arg);
        Err(SyncError::unsupported("try_release"))
    }

    /// Attempt to acquire in shared mode
    ///
    /// Negative on failure, zero if this acquire succeeded but no later shared
    /// acquire can, positive if later shared acquires may also succeed.
    fn try_acquire_shared(&self, sync: &Synchronizer<Self>, arg: i64) -> SyncResult<i64> {
        let _ = (sync, arg);
        Err(SyncError::unsupported("try_acquire_shared"))
    }

    /// Attempt to release in shared mode
    ///
    /// Returns `true` if the release may let a waiting acquire succeed.
    fn try_release_shared(&self, sync: &Synchronizer<Self>, arg: i64) -> SyncResult<bool> {
        let _ = (sync, arg);
        Err(SyncError::unsupported("try_release_shared"))
    }

    /// Whether the calling thread holds the synchronizer exclusively
    ///
    /// Only condition objects call this.
    fn is_held_exclusively(&self, sync: &Synchronizer<Self>) -> SyncResult<bool> {
        let _ = sync;
        Err(SyncError::unsupported("is_held_exclusively"))
    }
}
